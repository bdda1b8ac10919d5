//! Lamport clock and write stamps.
//!
//! Every write to the replicated document carries a [`Stamp`]. Stamps are
//! totally ordered (logical clock first, replica id as the tie-breaker),
//! which is what makes last-writer-wins merges deterministic across
//! replicas that never coordinate.

#[cfg(test)]
#[path = "clock_test.rs"]
mod clock_test;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Totally ordered write stamp: logical clock, then replica id.
///
/// Field order matters — the derived `Ord` compares `clock` before
/// `replica`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    /// Lamport clock value at the time of the write.
    pub clock: u64,
    /// Id of the replica that produced the write.
    pub replica: Uuid,
}

/// Per-replica Lamport clock.
///
/// `tick` produces the stamp for a local write; `observe` folds in a stamp
/// received from a peer so later local writes order after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LamportClock {
    replica: Uuid,
    counter: u64,
}

impl LamportClock {
    /// Create a clock for the given replica, starting at zero.
    #[must_use]
    pub fn new(replica: Uuid) -> Self {
        Self { replica, counter: 0 }
    }

    /// Create a clock resuming from a known counter value (snapshot load).
    #[must_use]
    pub fn resume(replica: Uuid, counter: u64) -> Self {
        Self { replica, counter }
    }

    /// The replica id this clock stamps writes with.
    #[must_use]
    pub fn replica(&self) -> Uuid {
        self.replica
    }

    /// Current counter value. Advances only through `tick` and `observe`.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.counter
    }

    /// Advance the clock and return a stamp for a local write.
    pub fn tick(&mut self) -> Stamp {
        self.counter += 1;
        Stamp { clock: self.counter, replica: self.replica }
    }

    /// Fold in a remote stamp so subsequent local writes order after it.
    pub fn observe(&mut self, stamp: Stamp) {
        if stamp.clock > self.counter {
            self.counter = stamp.clock;
        }
    }
}
