use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Invalid stream target: {0}")]
    InvalidTarget(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The peer answered the upgrade request but refused or botched it.
    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Inbound frame of {size} bytes exceeds read limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Connection closed by peer{}", .0.as_ref().map(|r| format!(": {}", r)).unwrap_or_default())]
    Closed(Option<String>),

    #[error("Read error: {0}")]
    Read(String),

    #[error("Peer did not acknowledge keepalive probes within {0:?}")]
    KeepaliveTimeout(Duration),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::core::config::ConfigError),
}

impl StreamError {
    /// Returns true for failures where the peer was reached but rejected the upgrade.
    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Handshake(_))
    }

    /// Returns true for transient connect failures worth another `open` attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::ConnectionTimeout(_))
    }
}
