//! Time Source Abstraction
//!
//! Every timeout, cooldown and gap in the state machine is a lazy
//! wall-clock comparison made at call time; nothing expires on its own.
//! The clock is injected so those comparisons are testable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of unix-second timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall-clock time (production)
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }
}

/// Manually driven clock for tests
pub struct ManualClock {
    secs: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at the given unix time
    pub fn new(start: u64) -> Self {
        Self {
            secs: AtomicU64::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }

    /// Set the clock to an absolute time
    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }
}
