// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct Counter(AtomicU64);

impl Counter {
    pub(crate) fn fetch_add(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn load(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// Six atomic counters tracking [`crate::BoundedMap`] admission
/// outcomes.
///
/// Invariant carried over from the original cache: `removed_outdated`
/// is always less than `inserted_new`, and
/// `removed_outdated + removed_updated <= inserted_new`; every
/// successful (non-panicking) call to `insert` falls into exactly one
/// of `inserted_new`, `insert_existing`, or `not_inserted`.
#[derive(Debug, Default)]
pub struct BoundedMapStats {
    pub(crate) inserted_new: Counter,
    pub(crate) insert_existing: Counter,
    pub(crate) removed_outdated: Counter,
    pub(crate) removed_updated: Counter,
    pub(crate) not_inserted: Counter,
    pub(crate) replaced: Counter,
}

/// A point-in-time read of [`BoundedMapStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub inserted_new: u64,
    pub insert_existing: u64,
    pub removed_outdated: u64,
    pub removed_updated: u64,
    pub not_inserted: u64,
    pub replaced: u64,
}

impl BoundedMapStats {
    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            inserted_new: self.inserted_new.load(),
            insert_existing: self.insert_existing.load(),
            removed_outdated: self.removed_outdated.load(),
            removed_updated: self.removed_updated.load(),
            not_inserted: self.not_inserted.load(),
            replaced: self.replaced.load(),
        }
    }

    pub(crate) fn reset(&self) {
        self.inserted_new.reset();
        self.insert_existing.reset();
        self.removed_outdated.reset();
        self.removed_updated.reset();
        self.not_inserted.reset();
        self.replaced.reset();
    }
}
