/// Stream kernel - the WebSocket transport every Binance stream is built from
///
/// Depth, kline, trade, ticker and user-data streams all run on the same
/// primitive: a [`session`] that owns one socket, forwards raw frames to a
/// caller-supplied handler and exposes a cooperative stop/done pair.
///
/// # Architecture
///
/// ## Transport Layer
/// - `ws`: `WsConfig`, `KeepaliveConfig` and the upgrade handshake
/// - `session`: `open`, `StreamHandle`, `StopHandle`, `DoneSignal`
/// - `keepalive`: ping/pong liveness monitor composed by the session
///
/// ## Message Handling
/// - `MessageHandler` / `ErrorHandler`: the sinks a session reports to
///
/// ## Recovery
/// - `open_with_retry`: backoff around `open`, layered outside the session
///
/// # Usage
///
/// ```rust,no_run
/// use binance_streams::core::kernel::*;
/// use binance_streams::StreamError;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = WsConfig::default()
///     .with_keepalive(KeepaliveConfig::enabled(Duration::from_secs(60)));
///
/// let handle = open(
///     "wss://stream.binance.com:9443/ws/btcusdt@trade",
///     &config,
///     |payload: Vec<u8>| println!("{}", String::from_utf8_lossy(&payload)),
///     |error: StreamError| eprintln!("stream failed: {}", error),
/// )
/// .await?;
///
/// tokio::time::sleep(Duration::from_secs(5)).await;
/// handle.stop();
/// handle.wait().await;
/// # Ok(())
/// # }
/// ```
pub mod handler;
pub(crate) mod keepalive;
pub mod reconnect;
pub mod session;
pub mod ws;

// Re-export key types for convenience
pub use handler::{ErrorHandler, MessageHandler};
pub use reconnect::{open_with_retry, ReconnectPolicy};
pub use session::{open, DoneSignal, StopHandle, StreamHandle, TerminationReason};
pub use ws::{KeepaliveConfig, WsConfig};
