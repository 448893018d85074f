//! Generic expiring key-value cache
//!
//! A concurrent map with "already exists" insert semantics and optional
//! expiry by creation time and/or by last access time. Values are always
//! returned as clones; callers never hold a reference into the map.

use crate::error::CacheError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    ctime: Instant,
    atime: Instant,
}

/// Expiring key-value cache
pub struct Cache<K, V> {
    entries: DashMap<K, Entry<V>>,
    ctime_expiry: Option<Duration>,
    atime_expiry: Option<Duration>,
}

impl<K, V> Default for Cache<K, V>
where
    K: Eq + Hash + Clone + Display,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Display,
    V: Clone,
{
    /// Cache whose entries never expire
    pub fn new() -> Self {
        Self::with_expiry(None, None)
    }

    /// Cache whose entries expire `ctime_expiry` after insertion and/or
    /// `atime_expiry` after their last read
    pub fn with_expiry(ctime_expiry: Option<Duration>, atime_expiry: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ctime_expiry,
            atime_expiry,
        }
    }

    fn is_expired(&self, entry: &Entry<V>) -> bool {
        self.ctime_expiry.is_some_and(|ttl| entry.ctime.elapsed() > ttl)
            || self.atime_expiry.is_some_and(|ttl| entry.atime.elapsed() > ttl)
    }

    /// Insert `value` unless a live entry already holds `key`.
    ///
    /// Returns `None` when inserted, or a copy of the existing value (which
    /// is left untouched) when the key is taken.
    pub fn set(&self, key: K, value: V) -> Option<V> {
        let now = Instant::now();
        match self.entries.entry(key) {
            MapEntry::Occupied(mut occupied) => {
                if !self.is_expired(occupied.get()) {
                    return Some(occupied.get().value.clone());
                }
                occupied.insert(Entry {
                    value,
                    ctime: now,
                    atime: now,
                });
                None
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry {
                    value,
                    ctime: now,
                    atime: now,
                });
                None
            }
        }
    }

    /// Copy of the value at `key`
    pub fn get(&self, key: &K) -> Result<V, CacheError> {
        self.modify(key, |_| {})
    }

    /// Mutate the value at `key` in place and return a copy of the result
    pub fn modify<F>(&self, key: &K, f: F) -> Result<V, CacheError>
    where
        F: FnOnce(&mut V),
    {
        let expired = match self.entries.get_mut(key) {
            Some(mut entry) if !self.is_expired(&entry) => {
                entry.atime = Instant::now();
                f(&mut entry.value);
                return Ok(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, e| self.is_expired(e));
        }
        Err(CacheError::NotFound(key.to_string()))
    }

    /// Remove `key`, returning its value
    pub fn delete(&self, key: &K) -> Result<V, CacheError> {
        self.entries
            .remove(key)
            .map(|(_, e)| e.value)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    /// Snapshot of all live entries
    pub fn copy(&self) -> HashMap<K, V> {
        self.entries
            .iter()
            .filter(|e| !self.is_expired(e.value()))
            .map(|e| (e.key().clone(), e.value().value.clone()))
            .collect()
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !self.is_expired(e));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
