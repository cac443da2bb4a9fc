//! Durable (tier-2) storage trait and implementations.
//!
//! The [`RenderCache`](crate::RenderCache) only needs a handful of
//! key-value primitives from its persistent layer, plus two index-only scans
//! (by recency for eviction, by size for statistics). Anything that can
//! answer those can back the cache: an embedded database, a file, a remote
//! store.

#[cfg(any(test, feature = "mock"))]
mod mock;
mod sqlite;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockStore;
pub use self::sqlite::SqliteStore;
use crate::error::Result;
use crate::models::CacheEntry;
use async_trait::async_trait;
use std::sync::Arc;
use time::UtcDateTime;

/// Shared handle to a durable tier implementation.
pub type DurableHandle = Arc<dyn DurableStore>;

/// Persistent key-value store for rendered artifacts.
///
/// Implementations report failures as errors; it's the cache's job (not the
/// store's) to decide that a failure means "not cached".
///
/// # Examples
///
/// ```
/// use folio_cache::{CacheEntry, DurableStore, SqliteStore, Database};
/// use time::UtcDateTime;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let db = Database::connect_in_memory().await.unwrap();
/// let store = SqliteStore::from(&db);
/// store.put(&CacheEntry::new("k1", "A", "png", UtcDateTime::now())).await.unwrap();
/// assert_eq!(store.count().await.unwrap(), 1);
/// # }
/// ```
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Name of the backing store, used for logging only.
    fn name(&self) -> &str;

    /// Fetch a complete entry (value included).
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Insert or replace an entry. Replacing keeps the original creation
    /// time but takes the new value, size and access time.
    async fn put(&self, entry: &CacheEntry) -> Result<()>;

    /// Update an entry's access time without rewriting its value.
    async fn touch(&self, key: &str, at: UtcDateTime) -> Result<()>;

    /// Remove a single entry. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove several entries, returning how many existed.
    async fn delete_many(&self, keys: &[String]) -> Result<u64>;

    /// Remove every entry.
    async fn clear(&self) -> Result<()>;

    /// Number of stored entries.
    async fn count(&self) -> Result<u64>;

    /// Sum of the stored values' sizes.
    async fn total_bytes(&self) -> Result<u64>;

    /// Keys of the `limit` least recently accessed entries, oldest first.
    ///
    /// Entries with equal access times are returned in insertion order.
    /// Must not load values.
    async fn oldest_keys(&self, limit: u64) -> Result<Vec<String>>;
}
