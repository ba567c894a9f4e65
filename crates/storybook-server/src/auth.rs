//! Session verification and caching.
//!
//! Verifies bearer tokens issued by the identity provider and caches
//! successful verifications until the session expires, so repeat requests
//! skip the signature check.  The [`CurrentUser`] and [`MaybeUser`]
//! extractors expose the result to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use storybook_shared::session::{SessionClaims, SessionToken};
use storybook_shared::{SessionError, UserId};

use crate::api::AppState;
use crate::error::ServerError;

// ---------------------------------------------------------------------------
// Session verifier
// ---------------------------------------------------------------------------

/// Verifies and caches identity-provider sessions.
#[derive(Clone)]
pub struct SessionVerifier {
    provider_pubkey: Option<[u8; 32]>,
    /// Cache: encoded token -> verified claims.
    cache: Arc<RwLock<HashMap<String, SessionClaims>>>,
}

impl SessionVerifier {
    pub fn new(provider_pubkey: Option<[u8; 32]>) -> Self {
        Self {
            provider_pubkey,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Verify an encoded session token and return its claims.
    pub async fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        {
            let cache = self.cache.read().await;
            if let Some(claims) = cache.get(token) {
                if Utc::now() < claims.expires_at {
                    return Ok(claims.clone());
                }
            }
        }

        let Some(pubkey) = self.provider_pubkey else {
            return Err(SessionError::NoProviderKey);
        };

        let decoded = SessionToken::decode(token)?;
        if let Err(e) = decoded.verify_with_key(&pubkey) {
            debug!(error = %e, "Session verification failed");
            return Err(e);
        }

        let mut cache = self.cache.write().await;
        cache.insert(token.to_string(), decoded.claims.clone());

        debug!(user = %decoded.claims.user_id, "Session verified");
        Ok(decoded.claims)
    }

    /// Evict expired sessions from the cache.
    pub async fn purge_expired(&self) {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        let now = Utc::now();
        cache.retain(|_, claims| now < claims.expires_at);
        let removed = before - cache.len();
        if removed > 0 {
            debug!(removed, "Purged expired sessions");
        }
    }

    #[cfg(test)]
    async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

/// Pull the bearer token out of the `Authorization` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// An authenticated caller.  Rejects with 401 when no valid session is
/// presented.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub claims: SessionClaims,
}

impl CurrentUser {
    pub fn id(&self) -> &UserId {
        &self.claims.user_id
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or(ServerError::Unauthorized(SessionError::Missing))?;
        let claims = state
            .sessions
            .verify(token)
            .await
            .map_err(ServerError::Unauthorized)?;
        Ok(Self { claims })
    }
}

/// A caller who may or may not be signed in.
///
/// Anonymous requests resolve to `None`.  A token that is present but
/// invalid is still rejected, so a broken session never silently becomes a
/// demo session.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<CurrentUser>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if bearer_token(&parts.headers).is_none() {
            return Ok(Self(None));
        }
        CurrentUser::from_request_parts(parts, state)
            .await
            .map(|user| Self(Some(user)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn issue(key: &SigningKey, user: &str, ttl: Duration) -> String {
        SessionToken::issue(
            SessionClaims {
                user_id: UserId::from(user),
                name: Some("Ada".into()),
                email: None,
                expires_at: Utc::now() + ttl,
            },
            key,
        )
        .unwrap()
        .encode()
    }

    #[tokio::test]
    async fn test_verify_valid_session() {
        let provider = SigningKey::generate(&mut OsRng);
        let verifier = SessionVerifier::new(Some(provider.verifying_key().to_bytes()));
        let token = issue(&provider, "user_1", Duration::hours(1));

        let claims = verifier.verify(&token).await.unwrap();
        assert_eq!(claims.user_id.as_str(), "user_1");
        assert_eq!(verifier.cached_len().await, 1);

        // Second call should be served from cache.
        assert!(verifier.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_verify_expired_session() {
        let provider = SigningKey::generate(&mut OsRng);
        let verifier = SessionVerifier::new(Some(provider.verifying_key().to_bytes()));
        let token = issue(&provider, "user_1", Duration::seconds(-5));

        assert_eq!(verifier.verify(&token).await, Err(SessionError::Expired));
    }

    #[tokio::test]
    async fn test_verify_without_provider_key() {
        let provider = SigningKey::generate(&mut OsRng);
        let verifier = SessionVerifier::new(None);
        let token = issue(&provider, "user_1", Duration::hours(1));

        assert_eq!(
            verifier.verify(&token).await,
            Err(SessionError::NoProviderKey)
        );
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let provider = SigningKey::generate(&mut OsRng);
        let verifier = SessionVerifier::new(Some(provider.verifying_key().to_bytes()));
        let token = issue(&provider, "user_1", Duration::milliseconds(200));
        verifier.verify(&token).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        verifier.purge_expired().await;
        assert_eq!(verifier.cached_len().await, 0);
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert("authorization", "Basic xyz".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
