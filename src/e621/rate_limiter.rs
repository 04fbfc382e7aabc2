use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::RwLock;

/// Default pause after each download attempt.
pub(crate) const DEFAULT_DOWNLOAD_DELAY: Duration = Duration::from_millis(200);

/// A pacing policy applied between requests to the remote host.
pub(crate) trait RateLimit: Send + Sync {
    /// Blocks the calling thread until the next request may go out.
    fn pause(&self);
}

/// Sleeps a fixed delay after every attempted download.
#[derive(Debug, Clone)]
pub(crate) struct FixedDelayLimiter {
    delay: Duration,
    state: Arc<RwLock<LimiterStats>>,
}

/// Counters kept by a [FixedDelayLimiter].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LimiterStats {
    pub(crate) pauses: u64,
    pub(crate) total_delay: Duration,
}

impl FixedDelayLimiter {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: Arc::new(RwLock::new(LimiterStats::default())),
        }
    }

    pub(crate) fn delay(&self) -> Duration {
        self.delay
    }

    pub(crate) fn stats(&self) -> LimiterStats {
        *self.state.read()
    }
}

impl Default for FixedDelayLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_DOWNLOAD_DELAY)
    }
}

impl RateLimit for FixedDelayLimiter {
    fn pause(&self) {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let mut state = self.state.write();
        state.pauses += 1;
        state.total_delay += self.delay;
    }
}

/// A flag that asks a running scrape to stop before its next download.
///
/// The token is armed while a scrape is running so an interrupt can tell whether there is
/// anything to cancel.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    armed: Arc<AtomicBool>,
}

impl CancellationToken {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Marks a scrape as running and clears any earlier cancellation.
    pub(crate) fn arm(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}
