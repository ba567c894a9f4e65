//! HTTP API.
//!
//! Every route answers with the envelope `{success, data?, error?}`.  Errors
//! are produced by [`ServerError`]'s `IntoResponse`, successes by [`ok`] and
//! [`done`].

mod admin;
mod collaboration;
mod generate;
mod stories;


use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, FromRequest, FromRequestParts},
    http::Method,
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use storybook_shared::constants::{MAX_AUDIO_SIZE, MAX_JSON_BODY};
use storybook_shared::{StoryId, UserId};
use storybook_store::{Access, Database, Story};

use crate::ai::AiProvider;
use crate::auth::{MaybeUser, SessionVerifier};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Story store.  Never held across an `.await`.
    pub db: Arc<Mutex<Database>>,
    pub sessions: Arc<SessionVerifier>,
    pub ai: Arc<dyn AiProvider>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        db: Database,
        sessions: SessionVerifier,
        ai: Arc<dyn AiProvider>,
        config: ServerConfig,
    ) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            sessions: Arc::new(sessions),
            ai,
            rate_limiter: RateLimiter::from_config(&config),
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }

    /// Run `f` with exclusive access to the store.
    pub(crate) fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> Result<T, ServerError>,
    ) -> Result<T, ServerError> {
        let db = self
            .db
            .lock()
            .map_err(|_| ServerError::Internal("database lock poisoned".into()))?;
        f(&db)
    }

    /// Owner recorded for content created by `user`: the signed-in user, or
    /// the shared demo owner when demo mode is enabled.
    pub(crate) fn owner_for(&self, user: &MaybeUser) -> Result<(UserId, bool), ServerError> {
        match &user.0 {
            Some(current) => Ok((current.id().clone(), false)),
            None if self.config.allow_demo => Ok((UserId::demo(), true)),
            None => Err(ServerError::Unauthorized(
                storybook_shared::SessionError::Missing,
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope and extractors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ServerError>;

pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse {
        success: true,
        data: Some(data),
        message: None,
    }))
}

/// Success without a payload.
pub fn done(message: &'static str) -> ApiResult<()> {
    Ok(Json(ApiResponse {
        success: true,
        data: None,
        message: Some(message),
    }))
}

/// JSON body whose rejections use the API envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ServerError))]
pub struct ApiJson<T>(pub T);

/// Query string whose rejections use the API envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ServerError))]
pub struct ApiQuery<T>(pub T);

// ---------------------------------------------------------------------------
// Story access
// ---------------------------------------------------------------------------

/// What a handler is about to do with a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Need {
    Read,
    Edit,
    Manage,
}

/// Unparseable ids can never name a stored story.
pub(crate) fn parse_story_id(raw: &str) -> Result<StoryId, ServerError> {
    StoryId::parse(raw).map_err(|_| ServerError::NotFound("Story not found".into()))
}

/// Load a story and check that `user` may do `need` with it.  A missing story
/// is reported before a denied one.
pub(crate) fn load_authorized(
    db: &Database,
    raw_id: &str,
    user: &UserId,
    need: Need,
    denied: &str,
) -> Result<(Story, Access), ServerError> {
    let story = db.get_story(parse_story_id(raw_id)?)?;
    let access = Access::resolve(&story, user);
    let allowed = match need {
        Need::Read => access.can_read(),
        Need::Edit => access.can_edit(),
        Need::Manage => access.can_manage(),
    };
    if !allowed {
        tracing::debug!(story_id = %story.id, user = %user, ?need, "story access denied");
        return Err(ServerError::Forbidden(denied.to_string()));
    }
    Ok((story, access))
}

/// Reject blank or absent required strings.
pub(crate) fn required(value: Option<String>, message: &str) -> Result<String, ServerError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ServerError::BadRequest(message.to_string()))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(admin::health_check))
        .route("/info", get(admin::server_info))
        .route("/admin/stats", get(admin::admin_stats))
        .route(
            "/api/stories",
            get(stories::list_stories).post(stories::create_story),
        )
        .route(
            "/api/stories/:id",
            get(stories::get_story)
                .put(stories::update_story)
                .delete(stories::delete_story),
        )
        .route("/api/save-story", post(stories::save_story))
        .route("/api/collaboration/invite", post(collaboration::invite))
        .route("/api/collaboration/update-role", put(collaboration::update_role))
        .route("/api/collaboration/remove", delete(collaboration::remove))
        .route(
            "/api/collaboration/collaborators",
            get(collaboration::list_collaborators),
        )
        .route("/api/collaboration/save-content", put(collaboration::save_content))
        .route("/api/collaboration/check-updates", get(collaboration::check_updates))
        .route("/api/generate", post(generate::generate_illustrated))
        .route("/api/generate-story", post(generate::generate_story))
        .route("/api/ai/generate-story", post(generate::generate_free_story))
        .route("/api/ai/enhance-story", post(generate::enhance_story))
        .route("/api/generate-image", post(generate::generate_image))
        .route(
            "/api/transcribe-audio",
            post(generate::transcribe_audio)
                .layer(DefaultBodyLimit::max(MAX_AUDIO_SIZE + MAX_JSON_BODY)),
        )
        .layer(DefaultBodyLimit::max(MAX_JSON_BODY))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
