use crate::core::errors::StreamError;
use crate::core::kernel::handler::{ErrorHandler, MessageHandler};
use crate::core::kernel::session::{open, StreamHandle};
use crate::core::kernel::ws::WsConfig;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, instrument, warn};

/// Backoff policy for re-running [`open`] after a failed connect
///
/// This only governs connection establishment. A session that dies after it
/// was opened stays dead; callers reopen it with another `open_with_retry`.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Attempts including the first one
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Randomize each delay between zero and its nominal value
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl ReconnectPolicy {
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delays between attempts: initial, 2x, 4x, ... capped at `max_delay`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        // ExponentialBackoff yields factor * base^n starting at n = 1.
        let factor = u64::try_from(self.initial_delay.as_millis() / 2)
            .unwrap_or(u64::MAX)
            .max(1);
        let use_jitter = self.jitter;

        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(self.max_delay)
            .map(move |delay| if use_jitter { jitter(delay) } else { delay })
            .take(self.max_attempts.saturating_sub(1))
    }
}

/// Open a session, retrying transient connect failures with backoff.
///
/// `handlers` is called once per attempt to produce a fresh message/error
/// handler pair. Only errors for which [`StreamError::is_retryable`] holds are
/// retried; a rejected handshake or an invalid target returns immediately.
#[instrument(skip_all, fields(url = %url, max_attempts = policy.max_attempts))]
pub async fn open_with_retry<M, E, F>(
    url: &str,
    config: &WsConfig,
    policy: &ReconnectPolicy,
    mut handlers: F,
) -> Result<StreamHandle, StreamError>
where
    M: MessageHandler,
    E: ErrorHandler,
    F: FnMut() -> (M, E),
{
    let mut attempt = 0usize;

    RetryIf::spawn(
        policy.delays(),
        || {
            attempt += 1;
            debug!(attempt, "Opening stream");
            let (on_message, on_error) = handlers();
            open(url, config, on_message, on_error)
        },
        |error: &StreamError| {
            let retry = error.is_retryable();
            if retry {
                warn!("Stream connect failed, backing off: {}", error);
            }
            retry
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_up_to_cap() {
        let policy = ReconnectPolicy::default()
            .with_max_attempts(6)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500))
            .with_jitter(false);

        let delays: Vec<u64> = policy.delays().map(|d| d.as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn test_single_attempt_has_no_delays() {
        let policy = ReconnectPolicy::default().with_max_attempts(1);
        assert_eq!(policy.delays().count(), 0);
    }

    #[test]
    fn test_jitter_never_exceeds_nominal_delay() {
        let policy = ReconnectPolicy::default()
            .with_max_attempts(4)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1));

        for (delay, nominal) in policy.delays().zip([100u64, 200, 400]) {
            assert!(delay <= Duration::from_millis(nominal));
        }
    }
}
