//! Operational routes: health, public instance info and admin statistics.

use axum::extract::State;
use axum::http::HeaderMap;
use chrono::Utc;
use serde::Serialize;
use subtle::ConstantTimeEq;

use storybook_shared::constants::{AUTOSAVE_DEBOUNCE_MS, IMAGE_SIZES, UPDATE_POLL_INTERVAL_SECS};
use storybook_store::StoryStats;

use super::{ok, ApiResult, AppState};
use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Serialize)]
pub struct HealthBody {
    status: &'static str,
    version: &'static str,
}

pub async fn health_check() -> ApiResult<HealthBody> {
    ok(HealthBody {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoBody {
    name: String,
    version: &'static str,
    demo_enabled: bool,
    generation_enabled: bool,
    poll_interval_secs: u64,
    autosave_debounce_ms: u64,
    image_sizes: &'static [&'static str],
}

pub async fn server_info(State(state): State<AppState>) -> ApiResult<InfoBody> {
    ok(InfoBody {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        demo_enabled: state.config.allow_demo,
        generation_enabled: state.config.ai.api_key.is_some(),
        poll_interval_secs: UPDATE_POLL_INTERVAL_SECS,
        autosave_debounce_ms: AUTOSAVE_DEBOUNCE_MS,
        image_sizes: IMAGE_SIZES,
    })
}

fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(expected) = config.admin_token.as_deref() else {
        return Err(ServerError::Forbidden(
            "Admin API is disabled (no ADMIN_TOKEN configured)".into(),
        ));
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = auth.strip_prefix("Bearer ").unwrap_or(auth).as_bytes();

    if token.len() != expected.len() || token.ct_eq(expected.as_bytes()).unwrap_u8() != 1 {
        return Err(ServerError::Forbidden("Invalid admin token".into()));
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatsBody {
    #[serde(flatten)]
    stats: StoryStats,
    uptime_secs: u64,
}

pub async fn admin_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<AdminStatsBody> {
    verify_admin_token(&headers, &state.config)?;
    let stats = state.with_db(|db| Ok(db.story_stats(Utc::now())?))?;
    ok(AdminStatsBody {
        stats,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
