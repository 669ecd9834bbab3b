//! Wall-clock and monotonic time sources.
//!
//! Nothing in the crate reads the current time directly; everything that needs
//! "now" takes a [`Clock`] so tests can drive both readings independently.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// A pair of clocks: the user-visible wall clock and a monotonic clock.
///
/// The monotonic reading is a duration since an arbitrary origin. It never goes
/// backwards while the origin is stable, but the origin may reset on reboot.
pub trait Clock: Send + Sync {
    fn wall_now(&self) -> DateTime<Utc>;
    fn monotonic_now(&self) -> Duration;
}

/// Host clocks.
///
/// On unix the monotonic reading is `CLOCK_MONOTONIC`, which is shared by all
/// processes and survives a relaunch. Elsewhere it is measured from the moment
/// this value was created.
#[derive(Debug, Clone)]
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
    fn wall_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    #[cfg(unix)]
    fn monotonic_now(&self) -> Duration {
        use nix::time::{clock_gettime, ClockId};

        match clock_gettime(ClockId::CLOCK_MONOTONIC) {
            Ok(ts) => Duration::new(
                u64::try_from(ts.tv_sec()).unwrap_or(0),
                u32::try_from(ts.tv_nsec()).unwrap_or(0),
            ),
            Err(err) => {
                tracing::warn!(error = %err, "CLOCK_MONOTONIC unavailable, using process clock");
                self.origin.elapsed()
            }
        }
    }

    #[cfg(not(unix))]
    fn monotonic_now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A hand-driven clock for tests and simulations.
///
/// `advance` moves both readings together. `advance_wall` alone models a
/// suspended host (the wall clock keeps going, the monotonic clock stalls) or a
/// manual clock change.
#[derive(Debug)]
pub struct ManualClock {
    inner: Mutex<ManualReadings>,
}

#[derive(Debug, Clone, Copy)]
struct ManualReadings {
    wall: DateTime<Utc>,
    monotonic: Duration,
}

impl ManualClock {
    pub fn new(wall: DateTime<Utc>, monotonic: Duration) -> Self {
        Self {
            inner: Mutex::new(ManualReadings { wall, monotonic }),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut r = self.lock();
        r.wall += by;
        r.monotonic += by;
    }

    pub fn advance_wall(&self, by: Duration) {
        self.lock().wall += by;
    }

    pub fn advance_monotonic(&self, by: Duration) {
        self.lock().monotonic += by;
    }

    pub fn set_wall(&self, wall: DateTime<Utc>) {
        self.lock().wall = wall;
    }

    pub fn set_monotonic(&self, monotonic: Duration) {
        self.lock().monotonic = monotonic;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualReadings> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn wall_now(&self) -> DateTime<Utc> {
        self.lock().wall
    }

    fn monotonic_now(&self) -> Duration {
        self.lock().monotonic
    }
}
