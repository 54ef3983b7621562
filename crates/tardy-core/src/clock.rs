//! Time sources for the queue.
//!
//! Every timestamp the queue records (`deliver_at`, `enqueued_at`,
//! `ack_deadline`) is read from a [`Clock`], so tests can move time forward
//! explicitly instead of sleeping.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A source of "now" in nanoseconds since the Unix epoch.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_ns(&self) -> u64;
}

/// Wall-clock time that never goes backwards.
///
/// Captures a `SystemTime`/`Instant` pair at construction and derives every
/// later reading from the monotonic `Instant`, so NTP adjustments cannot make
/// a deadline computed earlier appear to be in the future again.
#[derive(Debug, Clone)]
pub struct SystemClock {
    anchor_ns: u64,
    anchor: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        let anchor_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Self {
            anchor_ns,
            anchor: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ns(&self) -> u64 {
        self.anchor_ns
            .saturating_add(self.anchor.elapsed().as_nanos() as u64)
    }
}

/// A clock that only moves when told to. Safe to share between threads.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ns: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(start_ns),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now_ns
            .fetch_add(duration_ns(by), Ordering::SeqCst);
    }

    pub fn set(&self, now_ns: u64) {
        self.now_ns.store(now_ns, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}

/// Convert a duration to whole nanoseconds, saturating at `u64::MAX`.
pub(crate) fn duration_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
