//! Stopping the broker: close the listener, then drain emergency forwards
//! that are still talking to the collector.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// How long a stop waits for the listener and in-flight forwards.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// How a stop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Listener closed and every emergency task finished.
    Drained,
    /// The timeout hit with `abandoned` emergency tasks still running.
    TimedOut { abandoned: usize },
}

/// Owns the listener's stop signal and the tracker every emergency forward
/// and fan-out is spawned on.
pub struct ShutdownCoordinator {
    listener: CancellationToken,
    emergency_tasks: TaskTracker,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            listener: CancellationToken::new(),
            emergency_tasks: TaskTracker::new(),
        }
    }

    /// Cancelled when the listener should stop accepting.
    pub fn listener_token(&self) -> CancellationToken {
        self.listener.clone()
    }

    /// Tracker handed to the dispatcher.
    pub fn emergency_tasks(&self) -> TaskTracker {
        self.emergency_tasks.clone()
    }

    /// Emergency tasks not yet finished.
    pub fn in_flight(&self) -> usize {
        self.emergency_tasks.len()
    }

    pub fn is_stopping(&self) -> bool {
        self.listener.is_cancelled()
    }

    /// Stop the listener, wait for `server` to finish its open requests,
    /// then wait for every emergency task. All of it is bounded by
    /// `timeout`.
    ///
    /// Requests finishing during the wait may still trigger emergencies;
    /// those are drained too.
    pub async fn graceful_shutdown(
        &self,
        server: JoinHandle<()>,
        timeout: Option<Duration>,
    ) -> DrainOutcome {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);

        self.listener.cancel();
        self.emergency_tasks.close();
        info!(
            in_flight = self.in_flight(),
            timeout_ms = timeout.as_millis() as u64,
            "stopping listener and draining emergency forwards"
        );

        let drain = async {
            if let Err(e) = server.await {
                debug!(error = %e, "listener task ended abnormally");
            }
            self.emergency_tasks.wait().await;
        };
        match tokio::time::timeout(timeout, drain).await {
            Ok(()) => {
                info!("drained");
                DrainOutcome::Drained
            }
            Err(_) => {
                let abandoned = self.in_flight();
                warn!(abandoned, "drain timed out, emergency forwards abandoned");
                DrainOutcome::TimedOut { abandoned }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn idle_listener(token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { token.cancelled().await })
    }

    #[tokio::test]
    async fn stop_cancels_listener() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_stopping());
        let listener = idle_listener(coord.listener_token());
        let outcome = coord
            .graceful_shutdown(listener, Some(Duration::from_secs(1)))
            .await;
        assert_eq!(outcome, DrainOutcome::Drained);
        assert!(coord.is_stopping());
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_forward_finishes_before_stop_returns() {
        let coord = ShutdownCoordinator::new();
        let delivered = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&delivered);
        let _ = coord.emergency_tasks().spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(coord.in_flight(), 1);

        let listener = idle_listener(coord.listener_token());
        let outcome = coord
            .graceful_shutdown(listener, Some(Duration::from_secs(5)))
            .await;
        assert_eq!(outcome, DrainOutcome::Drained);
        assert!(delivered.load(Ordering::SeqCst));
        assert_eq!(coord.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_forward_is_abandoned_after_timeout() {
        let coord = ShutdownCoordinator::new();
        let _ = coord.emergency_tasks().spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let listener = idle_listener(coord.listener_token());
        let outcome = coord
            .graceful_shutdown(listener, Some(Duration::from_millis(50)))
            .await;
        assert_eq!(outcome, DrainOutcome::TimedOut { abandoned: 1 });
    }
}
