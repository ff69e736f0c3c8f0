//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.  Unparsable values are logged and
//! replaced by the default rather than aborting startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use ember_engine::EngineConfig;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./ember.db`
    pub database_path: PathBuf,

    /// Ed25519 public key of the identity service that signs session tokens
    /// (hex-encoded, 64 chars).
    /// Env: `SESSION_PUBKEY`
    /// Default: all-zeros, which no token verifies against.
    pub session_pubkey: [u8; 32],

    /// Bearer secret for `/internal/*`.
    /// Env: `INTERNAL_TOKEN`
    /// Default: unset (internal API disabled).
    pub internal_token: Option<String>,

    /// JSONL file receiving analytics events.
    /// Env: `ANALYTICS_PATH`
    /// Default: unset (events are only logged).
    pub analytics_path: Option<PathBuf>,

    /// Endpoint receiving match-created events.
    /// Env: `MATCH_WEBHOOK_URL`
    /// Default: unset (events are only logged).
    pub match_webhook_url: Option<String>,

    /// Engine tunables.
    /// Env: `QUOTA_DAILY_LIMIT`, `QUOTA_HOURLY_REFILL`, `ABUSE_WINDOW_SECS`,
    /// `ABUSE_THRESHOLD`, `QUEUE_OVERSAMPLE`, `QUEUE_MAX_LIMIT`
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: PathBuf::from("./ember.db"),
            session_pubkey: [0u8; 32],
            internal_token: None,
            analytics_path: None,
            match_webhook_url: None,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Self::from_env`] over an arbitrary variable source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        parse_into(&get, "HTTP_ADDR", &mut config.http_addr);

        if let Some(path) = non_empty(get("DATABASE_PATH")) {
            config.database_path = PathBuf::from(path);
        }

        if let Some(hex_key) = non_empty(get("SESSION_PUBKEY")) {
            match parse_hex_pubkey(&hex_key) {
                Ok(key) => config.session_pubkey = key,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid SESSION_PUBKEY, every session will be rejected"
                    );
                }
            }
        }

        config.internal_token = non_empty(get("INTERNAL_TOKEN"));
        config.analytics_path = non_empty(get("ANALYTICS_PATH")).map(PathBuf::from);
        config.match_webhook_url = non_empty(get("MATCH_WEBHOOK_URL"));

        let engine = &mut config.engine;
        parse_into(&get, "QUOTA_DAILY_LIMIT", &mut engine.quota.base_daily_limit);
        parse_into(&get, "QUOTA_HOURLY_REFILL", &mut engine.quota.hourly_refill);
        parse_into(&get, "ABUSE_WINDOW_SECS", &mut engine.abuse.window_secs);
        parse_into(&get, "ABUSE_THRESHOLD", &mut engine.abuse.threshold);
        parse_into(&get, "QUEUE_OVERSAMPLE", &mut engine.queue.oversample_factor);
        parse_into(&get, "QUEUE_MAX_LIMIT", &mut engine.queue.max_limit);

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_into<T>(get: &impl Fn(&str) -> Option<String>, name: &str, target: &mut T)
where
    T: FromStr,
{
    let Some(raw) = non_empty(get(name)) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => *target = v,
        Err(_) => tracing::warn!(var = name, value = %raw, "Invalid value, using default"),
    }
}

/// Parse a 64-character hex string into a 32-byte array.
fn parse_hex_pubkey(hex: &str) -> Result<[u8; 32], String> {
    let hex = hex.trim();
    if hex.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", hex.len()));
    }
    let bytes = hex::decode(hex).map_err(|e| format!("invalid hex: {e}"))?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.session_pubkey, [0u8; 32]);
        assert_eq!(config.engine.quota.base_daily_limit, 50);
        assert!(config.internal_token.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let key = "ab".repeat(32);
        let config = from(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("SESSION_PUBKEY", key.as_str()),
            ("QUOTA_DAILY_LIMIT", "25"),
            ("ABUSE_THRESHOLD", "7"),
            ("INTERNAL_TOKEN", "s3cret"),
            ("ANALYTICS_PATH", ""),
        ]);
        assert_eq!(config.http_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.session_pubkey, [0xab; 32]);
        assert_eq!(config.engine.quota.base_daily_limit, 25);
        assert_eq!(config.engine.abuse.threshold, 7);
        assert_eq!(config.internal_token.as_deref(), Some("s3cret"));
        assert!(config.analytics_path.is_none());
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = from(&[("QUOTA_HOURLY_REFILL", "lots"), ("HTTP_ADDR", "nowhere")]);
        assert_eq!(config.engine.quota.hourly_refill, 10);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
    }

    #[test]
    fn test_parse_hex_pubkey_wrong_length() {
        assert!(parse_hex_pubkey("abcd").is_err());
        assert!(parse_hex_pubkey(&"zz".repeat(32)).is_err());
    }
}
