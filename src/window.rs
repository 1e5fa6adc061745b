//! Sliding-window timestamp counter (C1).
//!
//! Each `(tenant, window-kind)` pair owns one [`SlidingWindow`]: an ordered
//! sequence of epoch-millisecond timestamps plus a `last_cleanup` stamp.
//! This is the primitive [`crate::admission::RateAdmissionController`]
//! composes four of (burst/minute/hour/execution-minute) per tenant.

use std::time::Duration;

/// Timestamps older than this many accesses without a cleanup are pruned
/// lazily rather than on every call, bounding per-op work (§4.1).
const CLEANUP_INTERVAL_MS: i64 = 1_000;

/// Hard cap before an immediate (non-lazy) prune kicks in on `record`.
const MAX_RETAINED: usize = 10_000;

/// An ordered sequence of epoch-ms timestamps with lazy eviction.
///
/// `admit?` never relies on the lazily-cleaned state for correctness: it
/// always recomputes the in-window count against `now - span`, so a stale
/// cleanup can only make `admit?` do slightly more work, never admit a
/// request it should have denied.
#[derive(Debug, Default, Clone)]
pub struct SlidingWindow {
    timestamps: Vec<i64>,
    last_cleanup: i64,
}

/// Outcome of a denied [`SlidingWindow::admit`] check — enough to build a
/// `Retry-After`/`X-RateLimit-Reset` response without re-scanning the
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenialInfo {
    pub reset_at_ms: i64,
    pub retry_after_ms: i64,
}

impl SlidingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timestamps with `ts > now - span`. Does not mutate state.
    pub fn count_in_window(&self, now: i64, span: Duration) -> usize {
        let cutoff = now - span.as_millis() as i64;
        self.timestamps.iter().filter(|&&ts| ts > cutoff).count()
    }

    /// True iff admitting one more record would not exceed `max`.
    pub fn admit(&mut self, now: i64, span: Duration, max: usize) -> bool {
        self.maybe_cleanup(now, span);
        self.count_in_window(now, span) < max
    }

    /// The time at which the oldest retained timestamp ages out of `span`,
    /// i.e. when the window would next admit a request it denies now.
    pub fn reset_at(&self, now: i64, span: Duration) -> i64 {
        let cutoff = now - span.as_millis() as i64;
        let oldest = self
            .timestamps
            .iter()
            .filter(|&&ts| ts > cutoff)
            .min()
            .copied();
        match oldest {
            Some(ts) => ts + span.as_millis() as i64,
            None => now,
        }
    }

    /// Computes denial metadata (reset time / retry-after) for the given
    /// span, based on the oldest timestamp retained in that window.
    pub fn denial_info(&self, now: i64, span: Duration) -> DenialInfo {
        let reset_at_ms = self.reset_at(now, span);
        let retry_after_ms = (reset_at_ms - now).max(0);
        DenialInfo {
            reset_at_ms,
            retry_after_ms,
        }
    }

    /// Appends `now`. If the sequence grows past [`MAX_RETAINED`] it is
    /// immediately pruned to `span`.
    pub fn record(&mut self, now: i64, span: Duration) {
        self.timestamps.push(now);
        if self.timestamps.len() > MAX_RETAINED {
            let cutoff = now - span.as_millis() as i64;
            self.timestamps.retain(|&ts| ts > cutoff);
        }
    }

    /// Clears the sequence.
    pub fn reset(&mut self) {
        self.timestamps.clear();
        self.last_cleanup = 0;
    }

    fn maybe_cleanup(&mut self, now: i64, span: Duration) {
        if now - self.last_cleanup > CLEANUP_INTERVAL_MS {
            let cutoff = now - span.as_millis() as i64;
            self.timestamps.retain(|&ts| ts > cutoff);
            self.last_cleanup = now;
        }
    }
}
