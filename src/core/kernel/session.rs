use crate::core::errors::StreamError;
use crate::core::kernel::handler::{ErrorHandler, MessageHandler};
use crate::core::kernel::keepalive::{KeepaliveMonitor, LastAck, SharedSink};
use crate::core::kernel::ws::{self, classify_read_error, WsConfig, WsReader};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

/// How long a caller-initiated close may spend writing the close frame.
const CLOSE_DEADLINE: Duration = Duration::from_secs(1);

/// Why a session stopped, or `Running` while it is still alive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TerminationReason {
    Running = 0,
    StoppedByCaller = 1,
    Failed = 2,
}

#[derive(Debug)]
struct SessionState(AtomicU8);

impl SessionState {
    fn new() -> Self {
        Self(AtomicU8::new(TerminationReason::Running as u8))
    }

    fn load(&self) -> TerminationReason {
        match self.0.load(Ordering::Acquire) {
            0 => TerminationReason::Running,
            1 => TerminationReason::StoppedByCaller,
            _ => TerminationReason::Failed,
        }
    }

    /// Leaves `Running` for `reason`. Only the first caller succeeds.
    fn finish(&self, reason: TerminationReason) -> bool {
        self.0
            .compare_exchange(
                TerminationReason::Running as u8,
                reason as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Caller side of a session's cooperative shutdown
///
/// Cloneable and safe to use from any task. `stop` never blocks and may be
/// called any number of times, including after the session already ended.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
    state: Arc<SessionState>,
}

impl StopHandle {
    /// Ask the session to shut down without reporting an error.
    pub fn stop(&self) {
        if self.state.finish(TerminationReason::StoppedByCaller) {
            debug!("Stream stop requested");
        }
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Completion signal of a session
///
/// Resolves once, after the read loop has returned and the keepalive task
/// has been joined. No message handler call happens after that point.
/// Once resolved, `reason` is never `Running`: a read task that dies without
/// settling (a panicking handler) is reported as `Failed` with no error
/// handler call.
#[derive(Debug, Clone)]
pub struct DoneSignal {
    rx: watch::Receiver<bool>,
    state: Arc<SessionState>,
}

impl DoneSignal {
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // A dropped sender means the session task is gone, which is also done.
        let _ = rx.wait_for(|done| *done).await;
    }

    pub fn is_done(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    pub fn reason(&self) -> TerminationReason {
        self.state.load()
    }
}

/// Handle to a running stream session
///
/// Dropping the handle does not stop the session; call [`StreamHandle::stop`].
#[derive(Debug)]
pub struct StreamHandle {
    url: String,
    stop: StopHandle,
    done: DoneSignal,
}

impl StreamHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn done(&self) -> DoneSignal {
        self.done.clone()
    }

    pub async fn wait(&self) {
        self.done.wait().await;
    }

    pub fn reason(&self) -> TerminationReason {
        self.done.reason()
    }

    /// Splits into the `(done, stop)` pair.
    pub fn split(self) -> (DoneSignal, StopHandle) {
        (self.done, self.stop)
    }
}

/// Open a stream session against `url`.
///
/// Connects synchronously from the caller's point of view: on failure the
/// error is returned and nothing is spawned. On success a read loop task is
/// spawned that forwards every Text/Binary frame to `on_message`, plus a
/// keepalive task when `config.keepalive.enabled` is set.
///
/// `on_error` runs at most once, only when the session ends for a reason other
/// than [`StopHandle::stop`]. There is no automatic reconnect.
#[instrument(skip_all, fields(url = %url))]
pub async fn open<M, E>(
    url: &str,
    config: &WsConfig,
    on_message: M,
    on_error: E,
) -> Result<StreamHandle, StreamError>
where
    M: MessageHandler,
    E: ErrorHandler,
{
    if config.keepalive.enabled && config.keepalive.timeout.is_zero() {
        return Err(StreamError::InvalidParameters(
            "keepalive timeout must be greater than zero".to_string(),
        ));
    }

    let socket = ws::connect(url, config).await?;
    let (sink, reader) = socket.split();
    let sink: SharedSink = Arc::new(Mutex::new(sink));

    let state = Arc::new(SessionState::new());
    let stop = CancellationToken::new();
    let keepalive_shutdown = CancellationToken::new();
    let expired = CancellationToken::new();
    let last_ack = Arc::new(LastAck::new());
    let (done_tx, done_rx) = watch::channel(false);

    let keepalive = config.keepalive.enabled.then(|| {
        KeepaliveMonitor::new(
            Arc::clone(&sink),
            config.keepalive.timeout,
            Arc::clone(&last_ack),
            keepalive_shutdown.clone(),
            expired.clone(),
        )
        .spawn()
    });

    let read_loop = ReadLoop {
        url: url.to_string(),
        reader,
        sink,
        state: Arc::clone(&state),
        stop: stop.clone(),
        expired,
        keepalive_timeout: config.keepalive.timeout,
        keepalive_shutdown,
        keepalive,
        last_ack,
        on_message,
        on_error: Some(on_error),
    };

    let completion = Completion {
        url: url.to_string(),
        state: Arc::clone(&state),
        done_tx,
    };
    tokio::spawn(async move {
        let _completion = completion;
        read_loop.run().await;
    });

    debug!(keepalive = config.keepalive.enabled, "Stream session opened");

    Ok(StreamHandle {
        url: url.to_string(),
        stop: StopHandle {
            token: stop,
            state: Arc::clone(&state),
        },
        done: DoneSignal { rx: done_rx, state },
    })
}

/// Resolves the done signal when the read task ends, however it ends.
///
/// Dropped with the task future, so this also runs when a handler panics.
/// The read loop settles the state itself on every normal path; a session
/// still `Running` here was torn down abnormally and is recorded as failed.
struct Completion {
    url: String,
    state: Arc<SessionState>,
    done_tx: watch::Sender<bool>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.state.finish(TerminationReason::Failed) {
            warn!(url = %self.url, "Stream task ended abnormally");
        }
        self.done_tx.send_replace(true);
    }
}

struct ReadLoop<M, E> {
    url: String,
    reader: WsReader,
    sink: SharedSink,
    state: Arc<SessionState>,
    stop: CancellationToken,
    expired: CancellationToken,
    keepalive_timeout: Duration,
    keepalive_shutdown: CancellationToken,
    keepalive: Option<JoinHandle<()>>,
    last_ack: Arc<LastAck>,
    on_message: M,
    on_error: Option<E>,
}

impl<M: MessageHandler, E: ErrorHandler> ReadLoop<M, E> {
    async fn run(mut self) {
        // Also fires if a handler panics, so the keepalive task never outlives us.
        let _keepalive_guard = self.keepalive_shutdown.clone().drop_guard();

        let stopped = match self.read_frames().await {
            None => {
                debug!(url = %self.url, "Stream stopped by caller");
                true
            }
            Some(error) => {
                self.fail(error);
                false
            }
        };

        self.keepalive_shutdown.cancel();
        if let Some(keepalive) = self.keepalive.take() {
            if let Err(e) = keepalive.await {
                warn!(url = %self.url, "Keepalive task ended abnormally: {}", e);
            }
        }

        if stopped {
            let mut sink = self.sink.lock().await;
            if let Ok(Err(e)) = tokio::time::timeout(CLOSE_DEADLINE, sink.close()).await {
                debug!(url = %self.url, "Close frame not delivered: {}", e);
            }
        }
    }

    /// Returns `None` when the caller stopped the session, otherwise the
    /// error that ended it.
    async fn read_frames(&mut self) -> Option<StreamError> {
        loop {
            let frame = tokio::select! {
                biased;
                () = self.stop.cancelled() => return None,
                () = self.expired.cancelled() => {
                    return Some(StreamError::KeepaliveTimeout(self.keepalive_timeout));
                }
                frame = self.reader.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => {
                    trace!(len = text.len(), "Text frame");
                    self.on_message.on_message(text.into_bytes());
                }
                Some(Ok(Message::Binary(data))) => {
                    trace!(len = data.len(), "Binary frame");
                    self.on_message.on_message(data);
                }
                Some(Ok(Message::Pong(_))) => self.last_ack.touch(),
                Some(Ok(Message::Close(frame))) => {
                    return Some(StreamError::Closed(frame.map(|f| f.to_string())));
                }
                // Pings are answered by the transport.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Some(classify_read_error(e)),
                None => return Some(StreamError::Closed(None)),
            }
        }
    }

    fn fail(&mut self, error: StreamError) {
        if !self.state.finish(TerminationReason::Failed) {
            debug!(url = %self.url, "Suppressed error after caller stop: {}", error);
            return;
        }

        warn!(url = %self.url, "Stream terminated: {}", error);
        if let Some(on_error) = self.on_error.take() {
            on_error.on_error(error);
        }
    }
}
