use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Nanoseconds elapsed since the clock's genesis instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const GENESIS: Timestamp = Timestamp(0);

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e9
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Shared logical time source anchored at a genesis instant.
///
/// Readings are strictly increasing across every caller: two calls never
/// return the same timestamp, even from different threads within the same
/// nanosecond.
#[derive(Debug)]
pub struct Clock {
    genesis: Instant,
    last_issued: AtomicU64,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            genesis: Instant::now(),
            last_issued: AtomicU64::new(0),
        }
    }

    pub fn genesis(&self) -> Instant {
        self.genesis
    }

    pub fn now(&self) -> Timestamp {
        let elapsed = u64::try_from(self.genesis.elapsed().as_nanos()).unwrap_or(u64::MAX);
        let mut prev = self.last_issued.load(Ordering::Relaxed);
        loop {
            let next = elapsed.max(prev.saturating_add(1));
            match self.last_issued.compare_exchange_weak(
                prev,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Timestamp(next),
                Err(observed) => prev = observed,
            }
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
