//! Engine clock: the single source of "now".
//!
//! RULE: Nothing in the engine calls `Utc::now()` directly.
//! Every timestamp (alert creation, notes, KYC reviews, audit rows)
//! flows through the `Clock` the engine was built with, so tests can
//! pin and advance time deterministically.

use crate::types::Timestamp;
use chrono::{Duration, Utc};
use parking_lot::RwLock;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time. Used in production wiring and by the runner.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    current: RwLock<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            current: RwLock::new(start),
        }
    }

    /// Move forward by `by`. Returns the new time.
    pub fn advance(&self, by: Duration) -> Timestamp {
        let mut current = self.current.write();
        *current += by;
        *current
    }

    pub fn advance_days(&self, days: i64) -> Timestamp {
        self.advance(Duration::days(days))
    }

    pub fn set(&self, to: Timestamp) {
        *self.current.write() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.read()
    }
}
