//! Bounded TTL cache with LRU eviction
//!
//! Not thread-safe on its own; wrap it in a lock when shared.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct TtlEntry<V> {
    value: V,
    expires_at: Instant,
    last_access: u64,
}

impl<V> TtlEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// A capacity-bounded cache whose entries expire after a fixed TTL.
///
/// When full, expired entries are dropped first, then the least recently
/// used entry is evicted.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, TtlEntry<V>>,
    max_entries: usize,
    default_ttl: Duration,
    /// Access counter for LRU tracking
    access_counter: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            default_ttl,
            access_counter: 0,
        }
    }

    /// Get a clone of a live value, dropping it if expired
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.access_counter += 1;

        match self.entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                self.entries.remove(key);
                None
            }
            Some(entry) => {
                entry.last_access = self.access_counter;
                Some(entry.value.clone())
            }
            None => None,
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        let ttl = self.default_ttl;
        self.insert_with_ttl(key, value, ttl);
    }

    pub fn insert_with_ttl(&mut self, key: K, value: V, ttl: Duration) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.cleanup_expired();
            if self.entries.len() >= self.max_entries {
                self.evict_lru();
            }
        }

        self.access_counter += 1;
        self.entries.insert(
            key,
            TtlEntry {
                value,
                expires_at: Instant::now() + ttl,
                last_access: self.access_counter,
            },
        );
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|e| e.value)
    }

    /// Remove every entry whose key fails the predicate; returns the count removed
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|k, _| keep(k));
        before - self.entries.len()
    }

    /// Drop expired entries; returns the count removed
    pub fn cleanup_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}
