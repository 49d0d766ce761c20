//! Keyspace implementation
//!
//! HashMap-based keyspace behind a parking_lot::RwLock, which never
//! poisons on panic. All operations take `&self`; interior mutability
//! keeps the type shareable behind an Arc.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;

use super::{glob_match, Entry};

/// Default page size for SCAN when the caller does not supply one
const DEFAULT_SCAN_COUNT: usize = 10;

/// One page of SCAN results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor to pass to the next call; 0 means the scan is complete
    pub next_cursor: usize,

    /// Keys in this page
    pub keys: Vec<String>,

    /// Whether more pages remain
    pub has_more: bool,
}

/// In-memory key-value state with per-key expiration
pub struct Keyspace {
    data: RwLock<HashMap<String, Entry>>,
}

impl Keyspace {
    /// Create an empty keyspace
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace a persistent entry; clears any TTL on the key
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut data = self.data.write();
        data.insert(key.into(), Entry::new(value));
    }

    /// Insert or replace an entry that expires after `ttl`
    pub fn set_with_ttl(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        let mut data = self.data.write();
        data.insert(key.into(), Entry::with_ttl(value, ttl));
    }

    /// Get a value by key, lazily reaping it if expired
    ///
    /// The hit path holds only the read lock; the write lock is taken
    /// just to remove an entry that turned out to be expired.
    pub fn get(&self, key: &str) -> Option<String> {
        {
            let data = self.data.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired on read: upgrade to the write lock and reap it.
        // Another writer may have replaced the entry in between, so
        // re-check before removing.
        let mut data = self.data.write();
        match data.get(key) {
            Some(entry) if entry.is_expired() => {
                data.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Get a copy of the full entry (value plus expiry), if live
    pub fn get_entry(&self, key: &str) -> Option<Entry> {
        let data = self.data.read();
        data.get(key).filter(|e| !e.is_expired()).cloned()
    }

    /// Remove a key
    ///
    /// Returns true iff the key existed; an expired entry counts as
    /// absent (and is reaped as a side effect).
    pub fn delete(&self, key: &str) -> bool {
        let mut data = self.data.write();
        match data.remove(key) {
            Some(entry) => !entry.is_expired(),
            None => false,
        }
    }

    /// Set or replace the TTL on an existing, live key
    ///
    /// Returns whether the expiration was applied.
    pub fn expire(&self, key: &str, ttl: Duration) -> bool {
        let mut data = self.data.write();
        match data.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.set_expiration(ttl);
                true
            }
            Some(_) => {
                data.remove(key);
                false
            }
            None => false,
        }
    }

    /// Remove the TTL from a key, making it persistent
    ///
    /// Returns whether the key existed (live).
    pub fn persist(&self, key: &str) -> bool {
        let mut data = self.data.write();
        match data.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.remove_expiration();
                true
            }
            Some(_) => {
                data.remove(key);
                false
            }
            None => false,
        }
    }

    /// Remaining time to live for a key, in seconds
    ///
    /// Returns -2 if the key is absent (or expired), -1 if it is
    /// persistent, otherwise the remaining seconds rounded up so that a
    /// key just set with TTL n reports a value in [1, n].
    pub fn ttl(&self, key: &str) -> i64 {
        let data = self.data.read();
        match data.get(key) {
            Some(entry) if !entry.is_expired() => match entry.remaining() {
                Some(left) => {
                    let secs = left.as_secs();
                    if left.subsec_nanos() > 0 {
                        secs as i64 + 1
                    } else {
                        secs as i64
                    }
                }
                None => -1,
            },
            _ => -2,
        }
    }

    /// Number of live entries
    ///
    /// Scans the map; expired-but-unreaped entries are not counted.
    pub fn len(&self) -> usize {
        let data = self.data.read();
        data.values().filter(|e| !e.is_expired()).count()
    }

    /// Whether the keyspace holds no live entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
    }

    /// All live keys matching the glob pattern
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let data = self.data.read();
        data.iter()
            .filter(|(_, entry)| !entry.is_expired())
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Paginated keys matching the glob pattern
    ///
    /// Matching keys are materialized and sorted before slicing, so on
    /// a quiescent keyspace a cursor walk starting at 0 visits every
    /// matching key exactly once. Under concurrent mutation, keys
    /// present for the whole walk are still visited; keys inserted or
    /// deleted mid-walk may or may not appear.
    pub fn scan(&self, cursor: usize, pattern: &str, count: usize) -> ScanPage {
        let count = if count == 0 { DEFAULT_SCAN_COUNT } else { count };

        let mut matching = self.keys(pattern);
        matching.sort_unstable();

        if cursor >= matching.len() {
            return ScanPage {
                next_cursor: 0,
                keys: Vec::new(),
                has_more: false,
            };
        }

        let end = (cursor + count).min(matching.len());
        let has_more = end < matching.len();

        ScanPage {
            next_cursor: if has_more { end } else { 0 },
            keys: matching[cursor..end].to_vec(),
            has_more,
        }
    }

    /// Remove every expired entry; returns how many were removed
    pub fn delete_expired(&self) -> usize {
        let mut data = self.data.write();
        let before = data.len();
        data.retain(|_, entry| !entry.is_expired());
        before - data.len()
    }

    /// Visit every live (key, value) pair
    ///
    /// The read lock is held for the whole iteration, so the callback
    /// sees a consistent view. Return false from the callback to stop.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(&str, &str) -> bool,
    {
        let data = self.data.read();
        for (key, entry) in data.iter() {
            if entry.is_expired() {
                continue;
            }
            if !f(key, &entry.value) {
                break;
            }
        }
    }

    /// Copy the live contents into an owned map (used by compaction)
    pub fn export(&self) -> HashMap<String, String> {
        let data = self.data.read();
        data.iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}
