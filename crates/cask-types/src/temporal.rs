use std::fmt;
use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Wall-clock milliseconds since the UNIX epoch.
///
/// Used for ref expiry stamps and the GC grace period. All comparisons are
/// plain integer ordering; the engine never assumes clocks across processes
/// agree to better than the grace period it is configured with.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from raw milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// The zero timestamp (epoch).
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Raw milliseconds since the epoch.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// This timestamp advanced by a duration (saturating).
    pub fn plus(&self, d: Duration) -> Self {
        Self(self.0.saturating_add(d.as_millis() as u64))
    }

    /// This timestamp moved back by a duration (saturating).
    pub fn minus(&self, d: Duration) -> Self {
        Self(self.0.saturating_sub(d.as_millis() as u64))
    }

    /// Elapsed time from `earlier` to `self`, zero if `earlier` is later.
    pub fn since(&self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}ms)", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time source seam.
///
/// Production code uses [`SystemClock`]; tests that exercise expiry
/// boundaries and grace periods use [`ManualClock`] and advance it
/// explicitly.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time from the operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Timestamp::from_millis(ms)
    }
}

/// A clock that only moves when told to. For tests.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<Timestamp>,
}

impl ManualClock {
    /// Create a manual clock starting at the given time.
    pub fn starting_at(now: Timestamp) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, d: Duration) {
        let mut now = self.now.write().expect("clock lock poisoned");
        *now = now.plus(d);
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, t: Timestamp) {
        *self.now.write().expect("clock lock poisoned") = t;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.read().expect("clock lock poisoned")
    }
}
