use super::{CameraSession, SessionShared};
use serde::Serialize;
use std::sync::Weak;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Outcome of one watchdog firing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    /// Nothing to supervise (idle, stopped or shut down)
    Idle,
    /// Frames are arriving within the timeout
    Healthy,
    /// A failed reconnect is waiting for the next timeout window
    Waiting,
    Reconnected,
    ReconnectFailed,
}

/// True when `elapsed` since the last mark exceeds `timeout`
pub fn liveness_expired(now: Instant, mark: Instant, timeout: Duration) -> bool {
    now.saturating_duration_since(mark) > timeout
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchdogStatus {
    pub armed: bool,
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

/// Periodic liveness check running on the tokio runtime the session was built in
pub(crate) struct Watchdog {
    poll_interval: Duration,
    timeout: Duration,
    runtime: Option<Handle>,
    token: Option<CancellationToken>,
}

impl Watchdog {
    pub fn new(poll_interval: Duration, timeout: Duration, runtime: Option<Handle>) -> Self {
        if runtime.is_none() {
            warn!("No tokio runtime available; camera watchdog is disabled");
        }
        Self {
            poll_interval,
            timeout,
            runtime,
            token: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start firing. A no-op when already armed.
    pub fn arm(&mut self, session: Weak<SessionShared>) {
        if self.is_armed() {
            return;
        }
        let Some(runtime) = &self.runtime else {
            return;
        };

        let token = CancellationToken::new();
        runtime.spawn(run(session, self.poll_interval, token.clone()));
        self.token = Some(token);
        info!(
            "Watchdog armed (poll {:?}, timeout {:?})",
            self.poll_interval, self.timeout
        );
    }

    pub fn disarm(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
            info!("Watchdog disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.token
            .as_ref()
            .map(|token| !token.is_cancelled())
            .unwrap_or(false)
    }

    pub fn status(&self) -> WatchdogStatus {
        WatchdogStatus {
            armed: self.is_armed(),
            poll_interval_ms: self.poll_interval.as_millis() as u64,
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

async fn run(session: Weak<SessionShared>, poll_interval: Duration, token: CancellationToken) {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = session.upgrade() else {
                    debug!("Session dropped, watchdog exiting");
                    break;
                };

                // Reconnecting blocks on the driver and the session lock
                let tick = tokio::task::spawn_blocking(move || {
                    CameraSession::from_shared(inner).watchdog_tick(Instant::now())
                });

                match tick.await {
                    Ok(verdict) => trace!("Watchdog tick: {:?}", verdict),
                    Err(e) => error!("Watchdog tick failed: {}", e),
                }
            }
        }
    }

    debug!("Watchdog task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_expired() {
        let mark = Instant::now();
        let timeout = Duration::from_secs(1);

        assert!(!liveness_expired(mark, mark, timeout));
        assert!(!liveness_expired(mark + timeout, mark, timeout));
        assert!(liveness_expired(
            mark + timeout + Duration::from_millis(1),
            mark,
            timeout
        ));
        // A mark newer than `now` never expires
        assert!(!liveness_expired(mark, mark + timeout * 5, timeout));
    }

    #[test]
    fn test_watchdog_without_runtime_never_arms() {
        let mut watchdog = Watchdog::new(Duration::from_millis(10), Duration::from_secs(1), None);
        watchdog.arm(Weak::new());
        assert!(!watchdog.is_armed());
        assert!(!watchdog.status().armed);
    }

    #[tokio::test]
    async fn test_arm_and_disarm() {
        let mut watchdog = Watchdog::new(
            Duration::from_millis(10),
            Duration::from_secs(1),
            Some(Handle::current()),
        );

        watchdog.arm(Weak::new());
        assert!(watchdog.is_armed());
        assert_eq!(watchdog.status().timeout_ms, 1000);

        watchdog.disarm();
        assert!(!watchdog.is_armed());
    }
}
