//! Rate limiting for dropped-record warnings.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default interval between dropped-record warnings.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

const NEVER: u64 = u64::MAX;

/// Counts dropped records and reports them at most once per interval.
///
/// Producers call [`record_drop`] for every rejected record and then
/// [`warn_if_due`], which invokes the callback with the accumulated count
/// when the interval has passed since the previous report. [`flush`] reports
/// immediately. Only one thread wins each reporting slot, so concurrent
/// producers never emit duplicate warnings.
///
/// [`record_drop`]: RateLimitedWarner::record_drop
/// [`warn_if_due`]: RateLimitedWarner::warn_if_due
/// [`flush`]: RateLimitedWarner::flush
pub struct RateLimitedWarner {
    origin: Instant,
    /// Milliseconds since `origin` of the last report, or `NEVER`.
    last_warn_ms: AtomicU64,
    dropped: AtomicU64,
    interval_ms: u64,
}

impl Default for RateLimitedWarner {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}

impl RateLimitedWarner {
    /// The first report is never delayed.
    pub fn new(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            last_warn_ms: AtomicU64::new(NEVER),
            dropped: AtomicU64::new(0),
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX - 1)
    }

    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of drops not yet reported.
    pub fn pending(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Report pending drops if the interval has elapsed.
    pub fn warn_if_due(&self, warn: impl FnOnce(u64)) {
        let now = self.elapsed_ms();
        let prev = self.last_warn_ms.load(Ordering::Acquire);
        let due = prev == NEVER || now.saturating_sub(prev) >= self.interval_ms;
        if !due || self.dropped.load(Ordering::Relaxed) == 0 {
            return;
        }
        if self
            .last_warn_ms
            .compare_exchange(prev, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
        }
    }

    /// Report pending drops now, regardless of the interval.
    pub fn flush(&self, warn: impl FnOnce(u64)) {
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            self.last_warn_ms.store(self.elapsed_ms(), Ordering::Release);
            warn(count);
        }
    }
}

impl std::fmt::Debug for RateLimitedWarner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedWarner")
            .field("interval_ms", &self.interval_ms)
            .field("pending", &self.pending())
            .finish()
    }
}
