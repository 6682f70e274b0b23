//! Rate limiting for repeated warnings.
//!
//! Asynchronous writes have nobody to return an error to, so failures are
//! logged instead. A sink that keeps failing would otherwise flood the log,
//! so [`RateLimitedWarner`] counts failures and emits at most one summary per
//! interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default minimum time between two summaries.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(millis)
        .unwrap_or(0)
}

/// Counts events and reports them through a callback at a bounded rate.
///
/// Callers bump the counter with [`record`](Self::record). The next call to
/// [`warn_if_due`](Self::warn_if_due) reports the accumulated count once the
/// interval has elapsed; [`flush`](Self::flush) reports it immediately.
pub struct RateLimitedWarner {
    interval_ms: u64,
    last_warn: AtomicU64,
    pending: AtomicU64,
}

impl RateLimitedWarner {
    /// Create a warner. The first warning may be emitted immediately.
    pub fn new(interval: Duration) -> Self {
        let interval_ms = millis(interval);
        Self {
            interval_ms,
            last_warn: AtomicU64::new(now_millis().saturating_sub(interval_ms)),
            pending: AtomicU64::new(0),
        }
    }

    pub fn record(&self) {
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    /// Report the pending count if the interval has elapsed.
    pub fn warn_if_due(&self, mut warn: impl FnMut(u64)) {
        let now = now_millis();
        let prev = self.last_warn.load(Ordering::Relaxed);
        if now.saturating_sub(prev) < self.interval_ms {
            return;
        }
        if self
            .last_warn
            .compare_exchange(prev, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            // another thread is reporting this window
            return;
        }
        let count = self.pending.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
        }
    }

    /// Report any pending count immediately.
    pub fn flush(&self, mut warn: impl FnMut(u64)) {
        let count = self.pending.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
            self.last_warn.store(now_millis(), Ordering::Relaxed);
        }
    }
}

impl Default for RateLimitedWarner {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}
