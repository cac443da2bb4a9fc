//! SQLite-backed durable tier.

use super::DurableStore;
use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{CacheEntry, EntryRow, unix_millis};
use async_trait::async_trait;
use exn::ResultExt;
use sqlx::SqlitePool;
use time::UtcDateTime;

/// Durable tier stored in a single `render_cache` table.
///
/// Values are only read by [`get`](DurableStore::get); eviction and
/// statistics run entirely off the covering `(last_accessed_at, key)` and
/// `size_bytes` indexes.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}
impl From<&Database> for SqliteStore {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl SqliteStore {
    /// Create a new store with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn to_i64(value: u64, field: &'static str) -> Result<i64> {
        i64::try_from(value).or_raise(|| ErrorKind::InvalidData(field))
    }

    fn to_u64(value: i64, field: &'static str) -> Result<u64> {
        u64::try_from(value).or_raise(|| ErrorKind::InvalidData(field))
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(include_str!("../../queries/get_entry.sql"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(CacheEntry::try_from).transpose()
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        let row = EntryRow::try_from(entry)?;
        sqlx::query(include_str!("../../queries/upsert_entry.sql"))
            .bind(row.key)
            .bind(row.kind)
            .bind(row.value)
            .bind(row.size_bytes)
            .bind(row.created_at)
            .bind(row.last_accessed_at)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn touch(&self, key: &str, at: UtcDateTime) -> Result<()> {
        sqlx::query(include_str!("../../queries/touch_entry.sql"))
            .bind(unix_millis(at))
            .bind(key)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query(include_str!("../../queries/delete_entry.sql"))
            .bind(key)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let mut deleted = 0u64;
        for key in keys {
            let result = sqlx::query(include_str!("../../queries/delete_entry.sql"))
                .bind(key)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            deleted += result.rows_affected();
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(deleted)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query(include_str!("../../queries/clear_entries.sql"))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../../queries/count_entries.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Self::to_u64(count, "entry count")
    }

    async fn total_bytes(&self) -> Result<u64> {
        let total: i64 = sqlx::query_scalar(include_str!("../../queries/total_bytes.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Self::to_u64(total, "total size")
    }

    async fn oldest_keys(&self, limit: u64) -> Result<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar(include_str!("../../queries/oldest_keys.sql"))
            .bind(Self::to_i64(limit, "limit")?)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    async fn store() -> (Database, SqliteStore) {
        let db = Database::connect_in_memory().await.unwrap();
        let store = SqliteStore::from(&db);
        (db, store)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (_db, store) = store().await;
        let entry = CacheEntry::new("k1", "A", "png", UtcDateTime::now());
        store.put(&entry).await.unwrap();
        let found = store.get("k1").await.unwrap().unwrap();
        assert_eq!(found.value, b"A");
        assert_eq!(found.kind, "png");
        assert!(store.get("k2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_value_but_keeps_creation_time() {
        let (_db, store) = store().await;
        let first = UtcDateTime::now() - Duration::hours(1);
        store.put(&CacheEntry::new("k1", "A", "png", first)).await.unwrap();
        store.put(&CacheEntry::new("k1", "BB", "svg", UtcDateTime::now())).await.unwrap();
        let found = store.get("k1").await.unwrap().unwrap();
        assert_eq!(found.value, b"BB");
        assert_eq!(found.size_bytes, 2);
        assert_eq!(unix_millis(found.created_at), unix_millis(first));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_oldest_keys_orders_by_access_then_insertion() {
        let (_db, store) = store().await;
        let now = UtcDateTime::now();
        for key in ["a", "b", "c", "d"] {
            store.put(&CacheEntry::new(key, "x", "png", now)).await.unwrap();
        }
        assert_eq!(store.oldest_keys(2).await.unwrap(), vec!["a", "b"]);
        store.touch("a", now + Duration::seconds(5)).await.unwrap();
        assert_eq!(store.oldest_keys(4).await.unwrap(), vec!["b", "c", "d", "a"]);
    }

    #[tokio::test]
    async fn test_oldest_keys_reads_only_the_recency_index() {
        let (_db, store) = store().await;
        let plan: Vec<(i64, i64, i64, String)> =
            sqlx::query_as(concat!("EXPLAIN QUERY PLAN ", include_str!("../../queries/oldest_keys.sql")))
                .bind(10_i64)
                .fetch_all(&store.pool)
                .await
                .unwrap();
        let details: Vec<_> = plan.into_iter().map(|(_, _, _, detail)| detail).collect();
        assert!(
            details.iter().any(|detail| detail.contains("USING COVERING INDEX render_cache_recency")),
            "unexpected plan: {details:?}"
        );
    }

    #[tokio::test]
    async fn test_delete_many_and_aggregates() {
        let (_db, store) = store().await;
        let now = UtcDateTime::now();
        store.put(&CacheEntry::new("a", "1", "png", now)).await.unwrap();
        store.put(&CacheEntry::new("b", "22", "png", now)).await.unwrap();
        store.put(&CacheEntry::new("c", "333", "png", now)).await.unwrap();
        assert_eq!(store.total_bytes().await.unwrap(), 6);
        let deleted = store.delete_many(&["a".to_string(), "missing".to_string()]).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count().await.unwrap(), 2);
        store.delete("b").await.unwrap();
        store.delete("b").await.unwrap();
        assert_eq!(store.total_bytes().await.unwrap(), 3);
        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.total_bytes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_pool_reports_database_error() {
        let (db, store) = store().await;
        db.close().await;
        let err = store.get("k1").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Database));
    }
}
