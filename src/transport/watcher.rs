//! Detection of closed preview windows.
//!
//! Detached windows expose no close event, so the default
//! [`PollingWatcher`] probes them on a fixed interval. Transports that do
//! report closing can plug in their own [`ConnectionWatcher`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Weak;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, trace, warn};

// ============================================================================
// Constants
// ============================================================================

/// Default delay between two liveness probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

// ============================================================================
// Traits
// ============================================================================

/// Something whose windows can be probed for liveness.
///
/// Implemented by the debugger server.
pub trait WatchTarget: Send + Sync {
    /// Probes every window once, removing the closed ones.
    fn poll_windows(&self);
}

/// Strategy used to detect that windows went away.
pub trait ConnectionWatcher: Send + Sync {
    /// Starts watching `target`. No-op if already running.
    fn start(&self, target: Weak<dyn WatchTarget>);

    /// Stops watching. No-op if not running.
    fn stop(&self);

    /// Returns `true` while watching.
    fn is_running(&self) -> bool;
}

// ============================================================================
// PollingWatcher
// ============================================================================

/// Probes windows every `interval` from a tokio task.
///
/// The first probe happens one full interval after `start`.
#[derive(Debug)]
pub struct PollingWatcher {
    /// Delay between probes.
    interval: Duration,
    /// Running poll task.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollingWatcher {
    /// Creates a watcher probing every `interval`.
    #[inline]
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            task: Mutex::new(None),
        }
    }

    /// Returns the probe interval.
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll loop. Ends when the target is dropped.
    async fn run(period: Duration, target: Weak<dyn WatchTarget>) {
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            ticker.tick().await;

            let Some(target) = target.upgrade() else {
                debug!("Watch target dropped, stopping poll loop");
                break;
            };

            trace!("Probing preview windows");
            target.poll_windows();
        }
    }
}

impl Default for PollingWatcher {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl ConnectionWatcher for PollingWatcher {
    fn start(&self, target: Weak<dyn WatchTarget>) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|running| !running.is_finished()) {
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!("No tokio runtime, closed preview windows will not be detected");
            return;
        };

        *task = Some(runtime.spawn(Self::run(self.interval, target)));
        debug!(interval_ms = self.interval.as_millis() as u64, "Window watcher started");
    }

    fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!("Window watcher stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|running| !running.is_finished())
    }
}

impl Drop for PollingWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
