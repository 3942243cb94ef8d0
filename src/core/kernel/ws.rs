use crate::core::errors::StreamError;
use futures_util::stream::{SplitSink, SplitStream};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::CapacityError;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, USER_AGENT};
use tokio_tungstenite::tungstenite::protocol::{Message, WebSocketConfig};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument};

/// Largest inbound message accepted before the read fails.
pub const DEFAULT_READ_LIMIT: usize = 655_350;
/// Idle tolerance used when keepalive is enabled without an explicit timeout.
pub const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSink = SplitSink<WsStream, Message>;
pub(crate) type WsReader = SplitStream<WsStream>;

/// Ping/pong liveness settings for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
    pub enabled: bool,
    /// Probe period and the longest tolerated gap between pongs
    pub timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: DEFAULT_KEEPALIVE_TIMEOUT,
        }
    }
}

impl KeepaliveConfig {
    pub fn enabled(timeout: Duration) -> Self {
        Self {
            enabled: true,
            timeout,
        }
    }
}

/// WebSocket transport configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Connection and handshake timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Ceiling on a single inbound message in bytes
    pub read_limit: usize,
    pub keepalive: KeepaliveConfig,
    /// Sent as the `User-Agent` header of the upgrade request
    pub user_agent: String,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000, // 10 seconds
            read_limit: DEFAULT_READ_LIMIT,
            keepalive: KeepaliveConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl WsConfig {
    pub fn with_connect_timeout_ms(mut self, connect_timeout_ms: u64) -> Self {
        self.connect_timeout_ms = connect_timeout_ms;
        self
    }

    pub fn with_read_limit(mut self, read_limit: usize) -> Self {
        self.read_limit = read_limit;
        self
    }

    pub fn with_keepalive(mut self, keepalive: KeepaliveConfig) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    fn socket_config(&self) -> WebSocketConfig {
        WebSocketConfig {
            max_message_size: Some(self.read_limit),
            max_frame_size: Some(self.read_limit),
            ..WebSocketConfig::default()
        }
    }
}

/// Open a WebSocket connection to `url`, completing the HTTP upgrade.
///
/// Failures are classified so callers can tell a rejected handshake
/// (`StreamError::Handshake`) from a transport problem (`StreamError::Network`,
/// `StreamError::ConnectionTimeout`).
#[instrument(skip_all, fields(url = %url))]
pub(crate) async fn connect(url: &str, config: &WsConfig) -> Result<WsStream, StreamError> {
    validate_target(url)?;

    let mut request = url
        .into_client_request()
        .map_err(|e| StreamError::InvalidTarget(format!("{}: {}", url, e)))?;
    let user_agent = HeaderValue::from_str(&config.user_agent)
        .map_err(|e| StreamError::InvalidParameters(format!("Invalid user agent: {}", e)))?;
    request.headers_mut().insert(USER_AGENT, user_agent);

    let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
    let connection_future = tokio::time::timeout(
        connect_timeout,
        connect_async_with_config(request, Some(config.socket_config()), false),
    );

    let (stream, response) = connection_future
        .await
        .map_err(|_| {
            StreamError::ConnectionTimeout(format!(
                "WebSocket handshake did not complete within {}ms",
                config.connect_timeout_ms
            ))
        })?
        .map_err(classify_connect_error)?;

    debug!(status = %response.status(), "WebSocket connected");
    Ok(stream)
}

pub(crate) fn validate_target(target: &str) -> Result<(), StreamError> {
    if target.trim().is_empty() {
        return Err(StreamError::InvalidTarget(
            "target address is empty".to_string(),
        ));
    }

    let lower = target.to_ascii_lowercase();
    if !(lower.starts_with("ws://") || lower.starts_with("wss://")) {
        return Err(StreamError::InvalidTarget(format!(
            "{}: scheme must be ws or wss",
            target
        )));
    }

    Ok(())
}

pub(crate) fn classify_connect_error(err: WsError) -> StreamError {
    match err {
        WsError::Http(response) => {
            StreamError::Handshake(format!("server responded with HTTP {}", response.status()))
        }
        WsError::HttpFormat(e) => StreamError::Handshake(e.to_string()),
        WsError::Protocol(e) => StreamError::Handshake(e.to_string()),
        WsError::Url(e) => StreamError::InvalidTarget(e.to_string()),
        other => StreamError::Network(other.to_string()),
    }
}

pub(crate) fn classify_read_error(err: WsError) -> StreamError {
    match err {
        WsError::Capacity(CapacityError::MessageTooLong { size, max_size }) => {
            StreamError::FrameTooLarge {
                size,
                max: max_size,
            }
        }
        WsError::ConnectionClosed | WsError::AlreadyClosed => StreamError::Closed(None),
        other => StreamError::Read(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::http::Response;

    #[test]
    fn test_default_config() {
        let config = WsConfig::default();
        assert_eq!(config.read_limit, 655_350);
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert!(!config.keepalive.enabled);
        assert_eq!(config.keepalive.timeout, Duration::from_secs(60));
        assert!(config.user_agent.starts_with("binance-streams/"));
    }

    #[test]
    fn test_socket_config_applies_read_limit() {
        let socket = WsConfig::default().with_read_limit(1024).socket_config();
        assert_eq!(socket.max_message_size, Some(1024));
        assert_eq!(socket.max_frame_size, Some(1024));
    }

    #[test]
    fn test_validate_target() {
        assert!(validate_target("wss://stream.binance.com:9443/ws/btcusdt@trade").is_ok());
        assert!(validate_target("ws://127.0.0.1:8080").is_ok());
        assert!(matches!(
            validate_target(""),
            Err(StreamError::InvalidTarget(_))
        ));
        assert!(matches!(
            validate_target("https://api.binance.com"),
            Err(StreamError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_http_rejection_is_handshake() {
        let response = Response::builder().status(403).body(None).unwrap();
        let err = classify_connect_error(WsError::Http(response));
        assert!(err.is_handshake());
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn test_io_failure_is_network() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = classify_connect_error(WsError::Io(io));
        assert!(matches!(err, StreamError::Network(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_oversized_message_maps_to_frame_too_large() {
        let err = classify_read_error(WsError::Capacity(CapacityError::MessageTooLong {
            size: 2048,
            max_size: 1024,
        }));
        assert!(matches!(
            err,
            StreamError::FrameTooLarge {
                size: 2048,
                max: 1024
            }
        ));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_scheme_without_io() {
        let err = connect("http://127.0.0.1:1", &WsConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::InvalidTarget(_)));
    }
}
