//! Time abstraction for the polling loops.
//!
//! Detection and session code never touch `Instant` or `thread::sleep`
//! directly; they go through a [`Clock`] so that tests can drive time with a
//! [`FakeClock`] instead of waiting on the wall clock.

use chrono::NaiveTime;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source with blocking sleep.
pub trait Clock: Send + Sync {
    /// Monotonic time since an arbitrary, fixed origin.
    fn now(&self) -> Duration;

    /// Block the current thread for `duration`.
    fn sleep(&self, duration: Duration);

    /// Wall-clock local time of day, used for calling windows.
    fn local_time(&self) -> NaiveTime;
}

/// Real clock backed by `Instant` and `thread::sleep`.
#[derive(Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn local_time(&self) -> NaiveTime {
        chrono::Local::now().time()
    }
}

/// Fake clock for tests. Sleeping advances time instantly.
///
/// Clones share the same underlying time, so a probe holding a clone can
/// simulate slow samples by calling [`FakeClock::advance`].
#[derive(Clone, Debug)]
pub struct FakeClock {
    nanos: Arc<AtomicU64>,
    time_of_day: NaiveTime,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::at_time_of_day(NaiveTime::MIN)
    }

    /// A fake clock whose local time starts at `time_of_day`.
    pub fn at_time_of_day(time_of_day: NaiveTime) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(0)),
            time_of_day,
        }
    }

    /// Move time forward. Saturates at `u64::MAX` nanoseconds instead of wrapping.
    pub fn advance(&self, duration: Duration) {
        let step = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |nanos| {
                Some(nanos.saturating_add(step))
            });
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }

    fn local_time(&self) -> NaiveTime {
        let offset = chrono::Duration::from_std(self.now()).unwrap_or_else(|_| chrono::Duration::zero());
        self.time_of_day + offset
    }
}
