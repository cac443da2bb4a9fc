//! Command handlers.
//!
//! Handlers write their output to the given writer rather than straight to
//! stdout so they can be exercised without a terminal.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use folio_cache::{CacheConfig, Database, RenderCache, SqliteStore, VisualConfig, canonicalize, digest};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Open the render cache over its SQLite database.
///
/// Unlike a renderer, administration has no use for a memory-only fallback:
/// a database that can't be opened is an error here.
pub async fn open_cache(config: CacheConfig, path: &Path) -> Result<RenderCache> {
    let db = Database::connect(path).await.or_raise(|| ErrorKind::Database)?;
    tracing::debug!(path = %path.display(), "Opened render cache database");
    RenderCache::new(config, Arc::new(SqliteStore::from(&db))).or_raise(|| ErrorKind::Config)
}

pub async fn stats(cache: &RenderCache, json: bool, out: &mut impl Write) -> Result<()> {
    let stats = cache.stats().await;
    if json {
        serde_json::to_writer_pretty(&mut *out, &stats).or_raise(|| ErrorKind::Io)?;
        writeln!(out).or_raise(|| ErrorKind::Io)
    } else {
        writeln!(out, "{stats}").or_raise(|| ErrorKind::Io)
    }
}

pub async fn clear(cache: &RenderCache, out: &mut impl Write) -> Result<()> {
    let before = cache.stats().await.tier2.count;
    cache.clear().await;
    writeln!(out, "Cleared {before} cached artifacts").or_raise(|| ErrorKind::Io)
}

pub async fn get(cache: &RenderCache, key: &str, out: &mut impl Write) -> Result<()> {
    let Some(value) = cache.get(key).await else {
        exn::bail!(ErrorKind::NotCached(key.to_string()));
    };
    out.write_all(&value).or_raise(|| ErrorKind::Io)?;
    out.flush().or_raise(|| ErrorKind::Io)
}

pub async fn delete(cache: &RenderCache, key: &str, out: &mut impl Write) -> Result<()> {
    let Some(info) = cache.inspect(key).await else {
        exn::bail!(ErrorKind::NotCached(key.to_string()));
    };
    cache.delete(key).await;
    writeln!(out, "Deleted {key} ({}, {} bytes)", info.kind, info.size_bytes).or_raise(|| ErrorKind::Io)
}

pub async fn prune(cache: &RenderCache, out: &mut impl Write) -> Result<()> {
    let removed = cache.prune().await;
    let stats = cache.stats().await;
    writeln!(out, "Evicted {removed} entries; {}/{} remain", stats.tier2.count, stats.tier2.capacity)
        .or_raise(|| ErrorKind::Io)
}

/// Print the digest of `input` the way the render pipeline keys its cache.
pub fn digest_input(
    kind: &str,
    input: &str,
    json: bool,
    visual: Option<&VisualConfig>,
    out: &mut impl Write,
) -> Result<()> {
    let content = if json {
        let payload: serde_json::Value =
            serde_json::from_str(input).or_raise(|| ErrorKind::InvalidInput("payload is not valid JSON"))?;
        canonicalize(&payload)
    } else {
        input.to_string()
    };
    writeln!(out, "{}", digest(kind, &content, visual)).or_raise(|| ErrorKind::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn cache(dir: &Path, durable_capacity: u64) -> RenderCache {
        let config = CacheConfig {
            durable_capacity,
            cleanup_delay_ms: 60_000,
            ..CacheConfig::default()
        };
        open_cache(config, &dir.join("render-cache.sqlite")).await.unwrap()
    }

    fn output(buffer: Vec<u8>) -> String {
        String::from_utf8(buffer).unwrap()
    }

    #[tokio::test]
    async fn test_get_writes_raw_value() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 10).await;
        cache.set("k1", "<svg/>", "mermaid").await;
        let mut out = vec![];
        get(&cache, "k1", &mut out).await.unwrap();
        assert_eq!(output(out), "<svg/>");
        let err = get(&cache, "k2", &mut vec![]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotCached(key) if key == "k2"));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 10).await;
        cache.set("k1", "AAA", "png").await;
        cache.set("k2", "B", "png").await;
        let mut out = vec![];
        delete(&cache, "k1", &mut out).await.unwrap();
        assert_eq!(output(out), "Deleted k1 (png, 3 bytes)\n");
        assert!(delete(&cache, "k1", &mut vec![]).await.is_err());
        let mut out = vec![];
        clear(&cache, &mut out).await.unwrap();
        assert_eq!(output(out), "Cleared 1 cached artifacts\n");
        assert!(cache.inspect("k2").await.is_none());
    }

    #[tokio::test]
    async fn test_prune_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 2).await;
        for key in ["a", "b", "c", "d"] {
            cache.set(key, "x", "png").await;
        }
        let mut out = vec![];
        prune(&cache, &mut out).await.unwrap();
        assert_eq!(output(out), "Evicted 2 entries; 2/2 remain\n");

        let mut out = vec![];
        stats(&cache, true, &mut out).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["tier2"]["count"], 2);
        assert_eq!(parsed["tier1"]["count"], 4);
    }

    #[test]
    fn test_digest_json_payload_is_key_order_independent() {
        let mut a = vec![];
        let mut b = vec![];
        digest_input("mermaid", r#"{"code": "x", "theme": "dark"}"#, true, None, &mut a).unwrap();
        digest_input("mermaid", r#"{"theme": "dark", "code": "x"}"#, true, None, &mut b).unwrap();
        assert_eq!(a, b);
        let expected = digest("mermaid", &canonicalize(&json!({"code": "x", "theme": "dark"})), None);
        assert_eq!(output(a), format!("{expected}\n"));
    }

    #[test]
    fn test_digest_rejects_invalid_json() {
        let err = digest_input("mermaid", "not json", true, None, &mut vec![]).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidInput(_)));
    }
}
