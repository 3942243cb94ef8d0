use crate::core::kernel::ws::{KeepaliveConfig, WsConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_STREAM_BASE_URL: &str = "wss://stream.binance.com:9443";
pub const TESTNET_STREAM_BASE_URL: &str = "wss://testnet.binance.vision";

/// User-facing stream settings, loadable from the environment or a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub testnet: bool,
    pub base_url: Option<String>,
    pub keepalive: bool,
    pub keepalive_timeout_secs: u64,
    pub read_limit: usize,
    pub connect_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        let ws = WsConfig::default();
        Self {
            testnet: false,
            base_url: None,
            keepalive: ws.keepalive.enabled,
            keepalive_timeout_secs: ws.keepalive.timeout.as_secs(),
            read_limit: ws.read_limit,
            connect_timeout_ms: ws.connect_timeout_ms,
        }
    }
}

impl StreamConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// All variables are optional:
    /// - `{EXCHANGE}_TESTNET`
    /// - `{EXCHANGE}_WS_BASE_URL`
    /// - `{EXCHANGE}_WS_KEEPALIVE`
    /// - `{EXCHANGE}_WS_TIMEOUT_SECS`
    /// - `{EXCHANGE}_WS_READ_LIMIT`
    /// - `{EXCHANGE}_WS_CONNECT_TIMEOUT_MS`
    pub fn from_env(exchange_prefix: &str) -> Result<Self, ConfigError> {
        let prefix = exchange_prefix.to_uppercase();
        let defaults = Self::default();

        Ok(Self {
            testnet: parse_var(&format!("{}_TESTNET", prefix))?.unwrap_or(defaults.testnet),
            base_url: env::var(format!("{}_WS_BASE_URL", prefix)).ok(),
            keepalive: parse_var(&format!("{}_WS_KEEPALIVE", prefix))?
                .unwrap_or(defaults.keepalive),
            keepalive_timeout_secs: parse_var(&format!("{}_WS_TIMEOUT_SECS", prefix))?
                .unwrap_or(defaults.keepalive_timeout_secs),
            read_limit: parse_var(&format!("{}_WS_READ_LIMIT", prefix))?
                .unwrap_or(defaults.read_limit),
            connect_timeout_ms: parse_var(&format!("{}_WS_CONNECT_TIMEOUT_MS", prefix))?
                .unwrap_or(defaults.connect_timeout_ms),
        })
    }

    /// Create configuration from .env file and environment variables
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(exchange_prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(exchange_prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    ///
    /// A missing file is not an error; system environment variables still apply.
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(
        exchange_prefix: &str,
        env_file_path: &str,
    ) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(()) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(exchange_prefix)
    }

    /// Set testnet mode
    #[must_use]
    pub const fn testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    /// Set custom stream base URL
    #[must_use]
    pub fn base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Enable ping/pong keepalive with the given idle tolerance
    #[must_use]
    pub const fn keepalive(mut self, enabled: bool, timeout_secs: u64) -> Self {
        self.keepalive = enabled;
        self.keepalive_timeout_secs = timeout_secs;
        self
    }

    /// Base URL for stream endpoints; an explicit override beats testnet mode.
    pub fn stream_base_url(&self) -> &str {
        if let Some(base_url) = self.base_url.as_deref() {
            return base_url.trim_end_matches('/');
        }
        if self.testnet {
            TESTNET_STREAM_BASE_URL
        } else {
            DEFAULT_STREAM_BASE_URL
        }
    }

    pub fn ws_config(&self) -> WsConfig {
        WsConfig::default()
            .with_connect_timeout_ms(self.connect_timeout_ms)
            .with_read_limit(self.read_limit)
            .with_keepalive(KeepaliveConfig {
                enabled: self.keepalive,
                timeout: Duration::from_secs(self.keepalive_timeout_secs),
            })
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "not valid unicode".to_string(),
        }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_ws_config() {
        let config = StreamConfig::default();
        assert!(!config.testnet);
        assert!(!config.keepalive);
        assert_eq!(config.keepalive_timeout_secs, 60);
        assert_eq!(config.read_limit, 655_350);
        assert_eq!(config.stream_base_url(), DEFAULT_STREAM_BASE_URL);
    }

    #[test]
    fn test_base_url_override_beats_testnet() {
        let config = StreamConfig::new()
            .testnet(true)
            .base_url("ws://127.0.0.1:9000/".to_string());
        assert_eq!(config.stream_base_url(), "ws://127.0.0.1:9000");

        let config = StreamConfig::new().testnet(true);
        assert_eq!(config.stream_base_url(), TESTNET_STREAM_BASE_URL);
    }

    #[test]
    fn test_ws_config_conversion() {
        let ws = StreamConfig::new().keepalive(true, 15).ws_config();
        assert!(ws.keepalive.enabled);
        assert_eq!(ws.keepalive.timeout, Duration::from_secs(15));
        assert_eq!(ws.read_limit, 655_350);
    }

    #[test]
    fn test_from_env_reads_prefixed_variables() {
        env::set_var("CFGTESTA_TESTNET", "true");
        env::set_var("CFGTESTA_WS_KEEPALIVE", "true");
        env::set_var("CFGTESTA_WS_TIMEOUT_SECS", "30");
        env::set_var("CFGTESTA_WS_READ_LIMIT", "1024");

        let config = StreamConfig::from_env("cfgtesta").unwrap();
        assert!(config.testnet);
        assert!(config.keepalive);
        assert_eq!(config.keepalive_timeout_secs, 30);
        assert_eq!(config.read_limit, 1024);
        assert_eq!(config.base_url, None);
        assert_eq!(config.connect_timeout_ms, 10_000);
    }

    #[test]
    fn test_from_env_rejects_malformed_values() {
        env::set_var("CFGTESTB_WS_TIMEOUT_SECS", "soon");

        let err = StreamConfig::from_env("CFGTESTB").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref name, .. } if name == "CFGTESTB_WS_TIMEOUT_SECS"));
    }
}
