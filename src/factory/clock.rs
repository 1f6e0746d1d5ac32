//! Logical time and call context.

use std::cell::Cell;
use primitive_types::H160;
use super::Timestamp;

/// Who is calling and when
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: H160,
    pub timestamp: Timestamp,
}

impl CallContext {
    pub fn new(caller: H160, timestamp: Timestamp) -> Self {
        Self { caller, timestamp }
    }
}

/// Source of logical time
pub trait Clock {
    fn now(&self) -> Timestamp;

    /// Build a call context for `caller` at the current time
    fn context(&self, caller: H160) -> CallContext {
        CallContext::new(caller, self.now())
    }
}

/// Wall clock in unix seconds
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// Deterministic clock; time only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    current: Cell<Timestamp>,
}

impl ManualClock {
    pub fn new(initial: Timestamp) -> Self {
        Self {
            current: Cell::new(initial),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.current.set(self.current.get() + secs);
    }

    pub fn set(&self, secs: Timestamp) {
        self.current.set(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.current.get()
    }
}
