//! ============================================================================
//! Session Configuration
//! ============================================================================
//! Loaded from environment variables (a `.env` file is honored):
//! - TWITTER_CONSUMER_KEY / TWITTER_CONSUMER_SECRET: app credentials
//! - TWITTER_CALLBACK_URL: redirect target registered for the app
//! - TWITTER_API_BASE_URL: API host (tests point this elsewhere)
//! - TWITTER_SESSION_DB_PATH: credential store location
//! - TWITTER_HTTP_TIMEOUT_SECS: per-request timeout
//! ============================================================================

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use tracing::warn;

pub const DEFAULT_API_BASE_URL: &str = "https://api.twitter.com";
pub const DEFAULT_CALLBACK_URL: &str = "http://127.0.0.1:9876/callback";

/// HTTP request timeout in seconds.
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub consumer_key: Option<String>,
    #[serde(skip_serializing)]
    pub consumer_secret: Option<String>,
    pub callback_url: String,
    pub api_base_url: String,
    pub db_path: Option<String>,
    pub http_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            consumer_key: None,
            consumer_secret: None,
            callback_url: DEFAULT_CALLBACK_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            db_path: None,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &self.consumer_secret.as_ref().map(|_| "***"))
            .field("callback_url", &self.callback_url)
            .field("api_base_url", &self.api_base_url)
            .field("db_path", &self.db_path)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

impl SessionConfig {
    /// Read configuration from the environment, loading `.env` first
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                warn!("Could not load .env file: {}", e);
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let http_timeout_secs = match get("TWITTER_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Ignoring invalid TWITTER_HTTP_TIMEOUT_SECS={}", raw);
                defaults.http_timeout_secs
            }),
            None => defaults.http_timeout_secs,
        };

        Self {
            consumer_key: get("TWITTER_CONSUMER_KEY"),
            consumer_secret: get("TWITTER_CONSUMER_SECRET"),
            callback_url: get("TWITTER_CALLBACK_URL").unwrap_or(defaults.callback_url),
            api_base_url: get("TWITTER_API_BASE_URL").unwrap_or(defaults.api_base_url),
            db_path: get("TWITTER_SESSION_DB_PATH"),
            http_timeout_secs,
        }
    }

    /// Socket address a loopback callback listener must bind to
    pub fn callback_bind_addr(&self) -> Result<SocketAddr> {
        let parsed = url::Url::parse(&self.callback_url)
            .map_err(|e| anyhow!("Invalid callback URL {}: {}", self.callback_url, e))?;
        parsed
            .socket_addrs(|| Some(80))
            .map_err(|e| anyhow!("Cannot resolve callback URL {}: {}", self.callback_url, e))?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Callback URL {} has no address", self.callback_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::from_lookup(|_| None);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.callback_url, DEFAULT_CALLBACK_URL);
        assert_eq!(config.http_timeout_secs, 30);
        assert!(config.consumer_key.is_none());
        assert!(config.db_path.is_none());
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("TWITTER_CONSUMER_KEY", "key"),
            ("TWITTER_CONSUMER_SECRET", "secret"),
            ("TWITTER_CALLBACK_URL", "http://127.0.0.1:8000/cb"),
            ("TWITTER_SESSION_DB_PATH", "/tmp/session.redb"),
            ("TWITTER_HTTP_TIMEOUT_SECS", "5"),
            ("TWITTER_API_BASE_URL", "  "),
        ]
        .into_iter()
        .collect();

        let config = SessionConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.consumer_key.as_deref(), Some("key"));
        assert_eq!(config.consumer_secret.as_deref(), Some("secret"));
        assert_eq!(config.db_path.as_deref(), Some("/tmp/session.redb"));
        assert_eq!(config.http_timeout_secs, 5);
        // blank value falls back to the default
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(
            config.callback_bind_addr().unwrap(),
            "127.0.0.1:8000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_invalid_timeout_uses_default() {
        let config = SessionConfig::from_lookup(|k| {
            (k == "TWITTER_HTTP_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert_eq!(config.http_timeout_secs, 30);
    }

    #[test]
    fn test_secret_not_serialized() {
        let config = SessionConfig {
            consumer_secret: Some("hidden".into()),
            ..SessionConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hidden"));
        assert!(!format!("{:?}", config).contains("hidden"));
    }
}
