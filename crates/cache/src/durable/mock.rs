//! In-memory durable tier for testing.

use super::DurableStore;
use crate::error::{ErrorKind, Result};
use crate::models::CacheEntry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use time::UtcDateTime;
use tokio::sync::RwLock;

/// In-memory durable tier for testing.
///
/// Entries live in a `HashMap` behind a [`RwLock`]. Reads and writes can be
/// made to fail independently, which is how tests exercise the cache's
/// degrade-to-miss and rollback paths without a broken database.
#[derive(Default)]
pub struct MockStore {
    // Insertion sequence number rides along to break recency ties.
    entries: RwLock<HashMap<String, (u64, CacheEntry)>>,
    sequence: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MockStore {
    /// Make every subsequent read (`get`, `count`, scans) fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write (`put`, `touch`, deletes) fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of the stored keys, oldest access first.
    pub async fn keys(&self) -> Vec<String> {
        let guard = self.entries.read().await;
        let mut entries: Vec<_> = guard.values().collect();
        entries.sort_by_key(|(seq, entry)| (entry.last_accessed_at, *seq));
        entries.into_iter().map(|(_, entry)| entry.key.clone()).collect()
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Unavailable);
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl DurableStore for MockStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.check_read()?;
        Ok(self.entries.read().await.get(key).map(|(_, entry)| entry.clone()))
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        self.check_write()?;
        let mut guard = self.entries.write().await;
        match guard.get_mut(&entry.key) {
            Some((_, existing)) => {
                let created_at = existing.created_at;
                *existing = entry.clone();
                existing.created_at = created_at;
            },
            None => {
                let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
                guard.insert(entry.key.clone(), (seq, entry.clone()));
            },
        }
        Ok(())
    }

    async fn touch(&self, key: &str, at: UtcDateTime) -> Result<()> {
        self.check_write()?;
        if let Some((_, entry)) = self.entries.write().await.get_mut(key) {
            entry.last_accessed_at = at;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_write()?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        self.check_write()?;
        let mut guard = self.entries.write().await;
        Ok(keys.iter().filter(|key| guard.remove(key.as_str()).is_some()).count() as u64)
    }

    async fn clear(&self) -> Result<()> {
        self.check_write()?;
        self.entries.write().await.clear();
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        self.check_read()?;
        Ok(self.entries.read().await.len() as u64)
    }

    async fn total_bytes(&self) -> Result<u64> {
        self.check_read()?;
        Ok(self.entries.read().await.values().map(|(_, entry)| entry.size_bytes).sum())
    }

    async fn oldest_keys(&self, limit: u64) -> Result<Vec<String>> {
        self.check_read()?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(self.keys().await.into_iter().take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MockStore::default();
        store.put(&CacheEntry::new("k1", "A", "png", UtcDateTime::now())).await.unwrap();
        assert_eq!(store.get("k1").await.unwrap().unwrap().value, b"A");
        store.delete("k1").await.unwrap();
        assert!(store.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MockStore::default();
        store.fail_writes(true);
        let err = store.put(&CacheEntry::new("k1", "A", "png", UtcDateTime::now())).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unavailable));
        store.fail_writes(false);
        store.put(&CacheEntry::new("k1", "A", "png", UtcDateTime::now())).await.unwrap();
        store.fail_reads(true);
        assert!(store.get("k1").await.is_err());
        assert!(store.count().await.is_err());
    }

    #[tokio::test]
    async fn test_oldest_keys_breaks_ties_by_insertion() {
        let store = MockStore::default();
        let now = UtcDateTime::now();
        for key in ["c", "a", "b"] {
            store.put(&CacheEntry::new(key, "x", "png", now)).await.unwrap();
        }
        assert_eq!(store.oldest_keys(2).await.unwrap(), vec!["c", "a"]);
    }
}
