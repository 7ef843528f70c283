// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Deduplicated time-series store keyed by sync identifier.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};

/// Items that can be merged into a [`SyncCache`].
pub trait Syncable: Clone {
    /// Provenance-stable deduplication key.
    fn sync_identifier(&self) -> &str;
    fn start_date(&self) -> DateTime<Utc>;
}

/// Ordering key: start date, then insertion sequence.
type EntryKey = (DateTime<Utc>, u64);

/// What a merge did to the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub updated: usize,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.inserted + self.updated > 0
    }
}

/// Append-mostly store ordered by start date.
///
/// Re-adding an item with a known sync identifier replaces it in place and
/// keeps its original insertion sequence, so ties on start date always
/// resolve in first-insertion order.
#[derive(Debug, Clone)]
pub struct SyncCache<T> {
    entries: BTreeMap<EntryKey, T>,
    index: HashMap<String, EntryKey>,
    next_seq: u64,
    retention: Duration,
}

impl<T: Syncable> SyncCache<T> {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: BTreeMap::new(),
            index: HashMap::new(),
            next_seq: 0,
            retention,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge items; idempotent per sync identifier.
    pub fn merge<I>(&mut self, items: I) -> MergeOutcome
    where
        I: IntoIterator<Item = T>,
    {
        let mut outcome = MergeOutcome::default();

        for item in items {
            let existing = self.index.get(item.sync_identifier()).copied();
            let key = match existing {
                Some(old_key) => {
                    self.entries.remove(&old_key);
                    outcome.updated += 1;
                    (item.start_date(), old_key.1)
                }
                None => {
                    let seq = self.next_seq;
                    self.next_seq += 1;
                    outcome.inserted += 1;
                    (item.start_date(), seq)
                }
            };
            self.index.insert(item.sync_identifier().to_string(), key);
            self.entries.insert(key, item);
        }

        outcome
    }

    /// Item with the greatest start date.
    pub fn latest(&self) -> Option<&T> {
        self.entries.last_key_value().map(|(_, item)| item)
    }

    /// Items with `start_date >= since`, ascending.
    pub fn query(&self, since: DateTime<Utc>) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.range((since, 0)..).map(|(_, item)| item)
    }

    /// Items with `start_date <= until`, ascending.
    pub fn until(&self, until: DateTime<Utc>) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.range(..=(until, u64::MAX)).map(|(_, item)| item)
    }

    /// All items, ascending.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.values()
    }

    pub fn get(&self, sync_identifier: &str) -> Option<&T> {
        self.index
            .get(sync_identifier)
            .and_then(|key| self.entries.get(key))
    }

    /// Drop items that started before `now - retention`. Returns how many went.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let kept = self.entries.split_off(&(cutoff, 0));
        let removed = std::mem::replace(&mut self.entries, kept);
        for item in removed.values() {
            self.index.remove(item.sync_identifier());
        }
        removed.len()
    }
}
