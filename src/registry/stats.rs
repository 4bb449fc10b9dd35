//! Registry-wide counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated with relaxed ordering
#[derive(Debug, Default)]
pub(super) struct RegistryCounters {
    pub(super) accepted: AtomicU64,
    pub(super) rejected_not_found: AtomicU64,
    pub(super) rejected_full: AtomicU64,
    pub(super) delivered: AtomicU64,
    pub(super) delivery_failures: AtomicU64,
    pub(super) rooms_created: AtomicU64,
    pub(super) rooms_removed: AtomicU64,
}

impl RegistryCounters {
    pub(super) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected_not_found: self.rejected_not_found.load(Ordering::Relaxed),
            rejected_full: self.rejected_full.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            rooms_created: self.rooms_created.load(Ordering::Relaxed),
            rooms_removed: self.rooms_removed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    /// Messages accepted into a room queue
    pub accepted: u64,
    /// Publishes to a room that did not exist
    pub rejected_not_found: u64,
    /// Publishes refused because the queue was full
    pub rejected_full: u64,
    /// Records written to a subscriber
    pub delivered: u64,
    /// Writes that failed because the subscriber was gone
    pub delivery_failures: u64,
    /// Rooms created
    pub rooms_created: u64,
    /// Rooms torn down
    pub rooms_removed: u64,
}

impl RegistrySnapshot {
    /// Total publishes that were not accepted
    pub fn rejected(&self) -> u64 {
        self.rejected_not_found + self.rejected_full
    }
}
