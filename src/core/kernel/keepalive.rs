use crate::core::kernel::ws::WsSink;
use futures_util::SinkExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Upper bound on writing a single ping frame.
pub(crate) const PING_WRITE_DEADLINE: Duration = Duration::from_secs(10);

pub(crate) type SharedSink = Arc<Mutex<WsSink>>;

/// Time of the most recent pong, stored as a nanosecond offset from a
/// monotonic anchor so it can cross tasks without a lock.
#[derive(Debug)]
pub(crate) struct LastAck {
    anchor: Instant,
    offset_ns: AtomicU64,
}

impl LastAck {
    pub(crate) fn new() -> Self {
        Self {
            anchor: Instant::now(),
            offset_ns: AtomicU64::new(0),
        }
    }

    /// Current time as an offset from the anchor.
    pub(crate) fn now(&self) -> u64 {
        u64::try_from(self.anchor.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    pub(crate) fn touch(&self) {
        self.offset_ns.fetch_max(self.now(), Ordering::AcqRel);
    }

    /// True if a pong arrived at or after `offset`.
    pub(crate) fn acked_since(&self, offset: u64) -> bool {
        self.offset_ns.load(Ordering::Acquire) >= offset
    }

    pub(crate) fn since(&self) -> Duration {
        let acked = self.offset_ns.load(Ordering::Acquire);
        Duration::from_nanos(self.now().saturating_sub(acked))
    }
}

/// Periodic ping loop guarding a session against a silently dead peer.
///
/// Every `timeout` the monitor writes a ping, waits one tick and then checks
/// that some pong arrived after that ping was written. A failed write or a
/// missing pong ends the loop; the missing pong also trips `expired` so the
/// read loop can report it. The monitor never reports errors itself.
pub(crate) struct KeepaliveMonitor {
    sink: SharedSink,
    timeout: Duration,
    last_ack: Arc<LastAck>,
    shutdown: CancellationToken,
    expired: CancellationToken,
}

impl KeepaliveMonitor {
    pub(crate) fn new(
        sink: SharedSink,
        timeout: Duration,
        last_ack: Arc<LastAck>,
        shutdown: CancellationToken,
        expired: CancellationToken,
    ) -> Self {
        Self {
            sink,
            timeout,
            last_ack,
            shutdown,
            expired,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.timeout, self.timeout);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let sent_at = self.last_ack.now();
            if !self.probe().await {
                return;
            }

            tokio::select! {
                () = self.shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }

            if !self.last_ack.acked_since(sent_at) {
                warn!(
                    silent_for = ?self.last_ack.since(),
                    timeout = ?self.timeout,
                    "Peer stopped answering keepalive probes"
                );
                self.expired.cancel();
                return;
            }
        }
    }

    /// Writes one ping; false means the loop should end.
    async fn probe(&self) -> bool {
        let deadline = PING_WRITE_DEADLINE.min(self.timeout);
        let send = async {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Ping(Vec::new())).await
        };

        tokio::select! {
            () = self.shutdown.cancelled() => false,
            result = tokio::time::timeout(deadline, send) => match result {
                Ok(Ok(())) => {
                    trace!("Keepalive ping sent");
                    true
                }
                Ok(Err(e)) => {
                    debug!("Keepalive ping failed: {}", e);
                    false
                }
                Err(_) => {
                    debug!("Keepalive ping not written within {:?}", deadline);
                    false
                }
            },
        }
    }
}
