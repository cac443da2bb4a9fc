//! In-process (tier-1) cache with exact LRU ordering.

use lru::LruCache;
use std::num::NonZeroUsize;
use time::UtcDateTime;

#[derive(Debug, Clone)]
pub(crate) struct MemoryEntry {
    pub(crate) value: Vec<u8>,
    pub(crate) kind: String,
    pub(crate) created_at: UtcDateTime,
    pub(crate) last_accessed_at: UtcDateTime,
}
impl MemoryEntry {
    pub(crate) fn new(value: Vec<u8>, kind: String, now: UtcDateTime) -> Self {
        Self {
            value,
            kind,
            created_at: now,
            last_accessed_at: now,
        }
    }
}

/// Strict LRU over a fixed number of entries.
///
/// [`LruCache`] keeps its hash map and recency list in lockstep, so the map
/// and the ordering can never disagree about which keys exist.
pub(crate) struct MemoryTier {
    entries: LruCache<String, MemoryEntry>,
}

impl MemoryTier {
    pub(crate) fn new(capacity: NonZeroUsize) -> Self {
        Self { entries: LruCache::new(capacity) }
    }

    /// Look up a key, promoting it to most-recently-used on a hit.
    pub(crate) fn get(&mut self, key: &str, now: UtcDateTime) -> Option<&MemoryEntry> {
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed_at = now;
        Some(&*entry)
    }

    /// Insert or replace a key as most-recently-used.
    ///
    /// Returns the keys evicted to make room (at most one, since the tier
    /// never exceeds its capacity).
    pub(crate) fn insert(&mut self, key: String, entry: MemoryEntry) -> Vec<String> {
        match self.entries.push(key.clone(), entry) {
            Some((evicted, _)) if evicted != key => vec![evicted],
            _ => vec![],
        }
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<MemoryEntry> {
        self.entries.pop(key)
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Look up a key without touching its recency.
    pub(crate) fn peek(&self, key: &str) -> Option<&MemoryEntry> {
        self.entries.peek(key)
    }

    pub(crate) fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|(_, entry)| entry.value.len() as u64).sum()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Keys from least- to most-recently-used.
    #[cfg(test)]
    pub(crate) fn keys_by_recency(&self) -> Vec<String> {
        self.entries.iter().rev().map(|(key, _)| key.clone()).collect()
    }
}
