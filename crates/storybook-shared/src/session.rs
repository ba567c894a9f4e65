//! Session tokens issued by the hosted identity provider.
//!
//! A token is `base64url(claims_json) "." base64url(signature)` where the
//! signature is the provider's Ed25519 signature over the exact claims bytes.
//! The server only ever verifies tokens; issuing is used by tests and by the
//! provider side.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::types::UserId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    /// Name to show for this user, falling back to the email local part.
    pub fn display_name(&self) -> Option<String> {
        self.name.clone().or_else(|| {
            self.email
                .as_deref()
                .and_then(|e| e.split('@').next())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    }
}

#[derive(Debug, Clone)]
pub struct SessionToken {
    pub claims: SessionClaims,
    payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl SessionToken {
    /// Sign a new token with the identity provider's key.
    pub fn issue(claims: SessionClaims, provider_key: &SigningKey) -> Result<Self, SessionError> {
        let payload = serde_json::to_vec(&claims).map_err(|_| SessionError::InvalidFormat)?;
        let signature = provider_key.sign(&payload);
        Ok(Self {
            claims,
            payload,
            signature: signature.to_bytes().to_vec(),
        })
    }

    pub fn encode(&self) -> String {
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&self.payload),
            URL_SAFE_NO_PAD.encode(&self.signature)
        )
    }

    pub fn decode(token: &str) -> Result<Self, SessionError> {
        let (payload_b64, sig_b64) = token
            .trim()
            .split_once('.')
            .ok_or(SessionError::InvalidFormat)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| SessionError::Base64Decode)?;
        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| SessionError::Base64Decode)?;
        let claims: SessionClaims =
            serde_json::from_slice(&payload).map_err(|_| SessionError::InvalidFormat)?;

        Ok(Self {
            claims,
            payload,
            signature,
        })
    }

    /// Verify the signature against the provider key and check expiry.
    pub fn verify_with_key(&self, provider_pubkey: &[u8; 32]) -> Result<(), SessionError> {
        if Utc::now() > self.claims.expires_at {
            return Err(SessionError::Expired);
        }

        let verifying_key =
            VerifyingKey::from_bytes(provider_pubkey).map_err(|_| SessionError::InvalidSignature)?;
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| SessionError::InvalidSignature)?;

        verifying_key
            .verify(&self.payload, &signature)
            .map_err(|_| SessionError::InvalidSignature)
    }
}
