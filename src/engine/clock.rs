//! Time source abstraction for the tick loop.
//!
//! The engine never reads the system clock directly; a trait seam allows
//! tests to drive ticks with a manual clock instead of sleeping.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of time for scheduling and timestamping.
pub trait Clock: Send + Sync {
    /// Monotonic instant for interval math.
    fn now_instant(&self) -> Instant;

    /// Wall-clock timestamp attached to observations.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Seconds since the Unix epoch; the shared anchor for diurnal and
    /// periodic algorithms.
    fn unix_seconds(&self) -> f64;

    /// Sleeps until the next tick is due.
    fn sleep(&self, duration: Duration);
}

/// The real system clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_instant(&self) -> Instant {
        Instant::now()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn unix_seconds(&self) -> f64 {
        let now = Utc::now();
        now.timestamp() as f64 + f64::from(now.timestamp_subsec_nanos()) * 1e-9
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock driven by hand. `sleep` advances time instead of blocking, so
/// a test can run thousands of ticks instantly and reproducibly.
#[derive(Debug)]
pub struct ManualClock {
    base_instant: Instant,
    base_unix: f64,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a manual clock anchored at the given Unix time.
    pub fn new(base_unix: f64) -> Self {
        Self {
            base_instant: Instant::now(),
            base_unix,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves time forward.
    pub fn advance(&self, duration: Duration) {
        *self.offset.lock().expect("clock lock poisoned") += duration;
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().expect("clock lock poisoned")
    }
}

impl Clock for ManualClock {
    fn now_instant(&self) -> Instant {
        self.base_instant + self.offset()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        let seconds = self.unix_seconds();
        Utc.timestamp_nanos((seconds * 1e9) as i64)
    }

    fn unix_seconds(&self) -> f64 {
        self.base_unix + self.offset().as_secs_f64()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
