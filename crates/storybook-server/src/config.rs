//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.  Without `IDENTITY_PUBKEY` every
//! authenticated route answers 401; without `OPENAI_API_KEY` every generation
//! route answers 500.

use std::net::SocketAddr;
use std::path::PathBuf;

use storybook_shared::constants::{APP_NAME, DEFAULT_HTTP_PORT, PUBKEY_SIZE};

/// Settings for the hosted generative-AI API.
#[derive(Clone)]
pub struct AiConfig {
    /// Env: `OPENAI_API_KEY`
    pub api_key: Option<String>,

    /// OpenAI-compatible API root.
    /// Env: `OPENAI_BASE_URL`
    /// Default: `https://api.openai.com/v1`
    pub base_url: String,

    /// Model drafting five-chapter stories.
    /// Env: `CHAT_MODEL`, default `gpt-4`
    pub chat_model: String,

    /// Model used for free-form stories and rewrites.
    /// Env: `ENHANCE_MODEL`, default `gpt-4o`
    pub enhance_model: String,

    /// Env: `IMAGE_MODEL`, default `dall-e-3`
    pub image_model: String,

    /// Env: `TRANSCRIBE_MODEL`, default `whisper-1`
    pub transcribe_model: String,

    /// Per-request timeout towards the AI vendor.
    /// Env: `AI_TIMEOUT_SECS`, default `120`
    pub timeout_secs: u64,
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("enhance_model", &self.enhance_model)
            .field("image_model", &self.image_model)
            .field("transcribe_model", &self.transcribe_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4".to_string(),
            enhance_model: "gpt-4o".to_string(),
            image_model: "dall-e-3".to_string(),
            transcribe_model: "whisper-1".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite file holding the stories collection.
    /// Env: `DATABASE_PATH`
    /// Default: `./storybook.db`
    pub database_path: PathBuf,

    /// Ed25519 public key of the identity provider (hex-encoded, 64 chars).
    /// Env: `IDENTITY_PUBKEY`
    /// Default: none (no session verifies).
    pub identity_pubkey: Option<[u8; PUBKEY_SIZE]>,

    pub ai: AiConfig,

    /// Human-readable name for this instance.
    /// Env: `INSTANCE_NAME`
    pub instance_name: String,

    /// Admin API bearer token. Required to access /admin/* endpoints.
    /// Env: `ADMIN_TOKEN`
    /// Default: empty (admin API disabled).
    pub admin_token: Option<String>,

    /// Whether anonymous visitors may generate and save demo stories.
    /// Env: `ALLOW_DEMO` (true/false)
    /// Default: `true`
    pub allow_demo: bool,

    /// Sustained requests per second per client IP.
    /// Env: `RATE_LIMIT_PER_SEC`, default `10`
    pub rate_limit_per_sec: f64,

    /// Burst size per client IP.
    /// Env: `RATE_LIMIT_BURST`, default `30`
    pub rate_limit_burst: f64,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("identity_pubkey", &self.identity_pubkey.map(hex::encode))
            .field("ai", &self.ai)
            .field("instance_name", &self.instance_name)
            .field("admin_enabled", &self.admin_token.is_some())
            .field("allow_demo", &self.allow_demo)
            .field("rate_limit_per_sec", &self.rate_limit_per_sec)
            .field("rate_limit_burst", &self.rate_limit_burst)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./storybook.db"),
            identity_pubkey: None,
            ai: AiConfig::default(),
            instance_name: APP_NAME.to_string(),
            admin_token: None,
            allow_demo: true,
            rate_limit_per_sec: 10.0,
            rate_limit_burst: 30.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(hex_key) = lookup("IDENTITY_PUBKEY") {
            match parse_hex_pubkey(&hex_key) {
                Ok(key) => config.identity_pubkey = Some(key),
                Err(e) => tracing::warn!(
                    error = %e,
                    "Invalid IDENTITY_PUBKEY, sessions will not verify"
                ),
            }
        }

        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            config.ai.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            config.ai.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("CHAT_MODEL") {
            config.ai.chat_model = model;
        }
        if let Some(model) = lookup("ENHANCE_MODEL") {
            config.ai.enhance_model = model;
        }
        if let Some(model) = lookup("IMAGE_MODEL") {
            config.ai.image_model = model;
        }
        if let Some(model) = lookup("TRANSCRIBE_MODEL") {
            config.ai.transcribe_model = model;
        }
        if let Some(val) = lookup("AI_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => config.ai.timeout_secs = n,
                _ => tracing::warn!(value = %val, "Invalid AI_TIMEOUT_SECS, using default"),
            }
        }

        if let Some(name) = lookup("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Some(token) = lookup("ADMIN_TOKEN").filter(|t| !t.is_empty()) {
            config.admin_token = Some(token);
        }

        if let Some(val) = lookup("ALLOW_DEMO") {
            config.allow_demo = val != "false" && val != "0";
        }

        if let Some(val) = lookup("RATE_LIMIT_PER_SEC") {
            match parse_positive(&val) {
                Some(n) => config.rate_limit_per_sec = n,
                None => tracing::warn!(value = %val, "Invalid RATE_LIMIT_PER_SEC, using default"),
            }
        }
        if let Some(val) = lookup("RATE_LIMIT_BURST") {
            match parse_positive(&val) {
                Some(n) if n >= 1.0 => config.rate_limit_burst = n,
                _ => tracing::warn!(value = %val, "Invalid RATE_LIMIT_BURST, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

/// A finite, strictly positive number.
fn parse_positive(val: &str) -> Option<f64> {
    val.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && *n > 0.0)
}

/// Parse a 64-character hex string into a 32-byte array.
fn parse_hex_pubkey(hex_str: &str) -> Result<[u8; PUBKEY_SIZE], String> {
    let hex_str = hex_str.trim();
    if hex_str.len() != PUBKEY_SIZE * 2 {
        return Err(format!(
            "expected {} hex chars, got {}",
            PUBKEY_SIZE * 2,
            hex_str.len()
        ));
    }

    let bytes = hex::decode(hex_str).map_err(|e| e.to_string())?;
    let mut key = [0u8; PUBKEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> ServerConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert!(config.identity_pubkey.is_none());
        assert!(config.allow_demo);
        assert_eq!(config.ai.chat_model, "gpt-4");
    }

    #[test]
    fn test_parse_hex_pubkey() {
        let hex = "ab".repeat(32);
        let key = parse_hex_pubkey(&hex).unwrap();
        assert_eq!(key, [0xab; 32]);
    }

    #[test]
    fn test_parse_hex_pubkey_wrong_length() {
        assert!(parse_hex_pubkey("abcd").is_err());
        assert!(parse_hex_pubkey(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let pubkey = "01".repeat(32);
        let config = from_pairs(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("IDENTITY_PUBKEY", pubkey.as_str()),
            ("OPENAI_BASE_URL", "http://localhost:4000/v1/"),
            ("ALLOW_DEMO", "false"),
            ("ADMIN_TOKEN", ""),
            ("AI_TIMEOUT_SECS", "0"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.identity_pubkey, Some([1u8; 32]));
        assert_eq!(config.ai.base_url, "http://localhost:4000/v1");
        assert!(!config.allow_demo);
        assert!(config.admin_token.is_none());
        assert_eq!(config.ai.timeout_secs, 120);
    }

    #[test]
    fn test_rate_limit_overrides() {
        let config = from_pairs(&[("RATE_LIMIT_PER_SEC", "2.5"), ("RATE_LIMIT_BURST", "5")]);
        assert_eq!(config.rate_limit_per_sec, 2.5);
        assert_eq!(config.rate_limit_burst, 5.0);

        for bad in ["0", "-3", "NaN", "inf", "lots"] {
            let config = from_pairs(&[("RATE_LIMIT_PER_SEC", bad), ("RATE_LIMIT_BURST", bad)]);
            assert_eq!(config.rate_limit_per_sec, 10.0, "{bad}");
            assert_eq!(config.rate_limit_burst, 30.0, "{bad}");
        }

        // A burst below one token would reject every request.
        let config = from_pairs(&[("RATE_LIMIT_BURST", "0.5")]);
        assert_eq!(config.rate_limit_burst, 30.0);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = from_pairs(&[("OPENAI_API_KEY", "sk-secret")]);
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
