use crate::config::CacheConfig;
use crate::db::Database;
use crate::durable::{DurableHandle, SqliteStore};
use crate::error::{ErrorKind, Result};
use crate::memory::{MemoryEntry, MemoryTier};
use crate::models::CacheEntry;
use crate::stats::{CacheStats, CombinedStats, DurableStats, MemoryStats};
use exn::OptionExt;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use time::UtcDateTime;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Which tier answered an [`inspect`](RenderCache::inspect) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Memory,
    Durable,
}

/// Metadata about a cached artifact, without its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub tier: Tier,
    pub kind: String,
    pub size_bytes: u64,
    pub created_at: UtcDateTime,
    pub last_accessed_at: UtcDateTime,
}

/// Two-tier cache for rendered artifacts.
///
/// Tier 1 is a strict LRU in process memory; tier 2 is a [`DurableStore`]
/// that survives restarts. Lookups check memory first and promote durable
/// hits into memory. Writes land in memory synchronously and in the durable
/// tier best-effort: a failed durable write rolls the memory entry back, so
/// memory never holds something that would vanish for good once evicted.
///
/// Nothing here returns an error. A broken durable tier only ever shows up as
/// a cache miss, a `false` from [`set`](Self::set), and a `warn` log line;
/// rendering must never depend on the cache.
///
/// The handle is cheap to clone and every clone shares the same tiers. Pass
/// one instance to each pipeline instead of reaching for a global.
///
/// [`DurableStore`]: crate::DurableStore
#[derive(Clone)]
pub struct RenderCache {
    inner: Arc<Inner>,
}

struct Inner {
    config: CacheConfig,
    memory: Mutex<MemoryTier>,
    durable: Option<DurableHandle>,
    /// Set while a cleanup pass is scheduled or running.
    cleanup_pending: AtomicBool,
    /// Set by triggers that fold into the pending pass; the pass evicts
    /// again before it releases `cleanup_pending`.
    cleanup_rerun: AtomicBool,
    cleanup_tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Held for the duration of an eviction pass.
    pass: tokio::sync::Mutex<()>,
    /// Bumped by `delete()`/`clear()` so that a durable read which started
    /// before them doesn't promote a removed entry back into memory.
    invalidations: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Tier-1 bookkeeping stays consistent between statements, so a panic
    // elsewhere while holding the lock doesn't invalidate it.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RenderCache {
    fn build(config: CacheConfig, durable: Option<DurableHandle>) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.memory_capacity)
            .ok_or_raise(|| ErrorKind::InvalidConfig("memory_capacity must be at least 1"))?;
        Ok(Self {
            inner: Arc::new(Inner {
                memory: Mutex::new(MemoryTier::new(capacity)),
                durable,
                config,
                cleanup_pending: AtomicBool::new(false),
                cleanup_rerun: AtomicBool::new(false),
                cleanup_tasks: Mutex::new(Vec::new()),
                pass: tokio::sync::Mutex::new(()),
                invalidations: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        })
    }

    /// Create a cache over the given durable tier.
    ///
    /// Only fails on an invalid configuration.
    pub fn new(config: CacheConfig, durable: DurableHandle) -> Result<Self> {
        Self::build(config, Some(durable))
    }

    /// Create a cache without a durable tier. Writes always succeed and only
    /// live as long as the process (or until evicted from memory).
    pub fn memory_only(config: CacheConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Open (or create) the SQLite durable tier at `path` and build a cache
    /// over it, falling back to memory-only when the database can't be used.
    pub async fn open(config: CacheConfig, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match Database::connect(path).await {
            Ok(db) => Self::new(config, Arc::new(SqliteStore::from(&db))),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = ?e,
                    "Durable render cache unavailable; using memory only"
                );
                Self::memory_only(config)
            },
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Whether a durable tier is attached.
    pub fn is_durable(&self) -> bool {
        self.inner.durable.is_some()
    }

    /// Look up a rendered artifact.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = UtcDateTime::now();
        let hit = lock(&self.inner.memory).get(key, now).map(|entry| entry.value.clone());
        if let Some(value) = hit {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key, tier = "memory", "Render cache hit");
            return Some(value);
        }
        let Some(durable) = &self.inner.durable else {
            return self.miss(key);
        };
        let generation = self.inner.invalidations.load(Ordering::SeqCst);
        let entry = match durable.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return self.miss(key),
            Err(e) => {
                tracing::warn!(
                    key,
                    store = durable.name(),
                    retryable = e.is_retryable(),
                    error = ?e,
                    "Durable cache read failed; treating as miss"
                );
                return self.miss(key);
            },
        };
        if self.inner.config.refresh_on_read
            && let Err(e) = durable.touch(key, now).await
        {
            tracing::warn!(
                key,
                store = durable.name(),
                retryable = e.is_retryable(),
                error = ?e,
                "Failed to refresh durable access time"
            );
        }
        if self.inner.invalidations.load(Ordering::SeqCst) == generation {
            let promoted = MemoryEntry {
                value: entry.value.clone(),
                kind: entry.kind,
                created_at: entry.created_at,
                last_accessed_at: now,
            };
            let evicted = lock(&self.inner.memory).insert(key.to_string(), promoted);
            tracing::trace!(key, ?evicted, "Promoted durable hit into memory");
        }
        self.inner.hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key, tier = "durable", "Render cache hit");
        Some(entry.value)
    }

    fn miss(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key, "Render cache miss");
        None
    }

    /// Store a rendered artifact of the given kind.
    ///
    /// The memory tier is updated before the first suspension point, so a
    /// `get()` issued right after this call starts is already a hit. Returns
    /// `false` if the durable write failed (and the memory entry was rolled
    /// back).
    pub async fn set(&self, key: impl Into<String>, value: impl Into<Vec<u8>>, kind: impl Into<String>) -> bool {
        let (key, value, kind) = (key.into(), value.into(), kind.into());
        let now = UtcDateTime::now();
        let evicted =
            lock(&self.inner.memory).insert(key.clone(), MemoryEntry::new(value.clone(), kind.clone(), now));
        if !evicted.is_empty() {
            tracing::debug!(?evicted, "Evicted least recently used entries from memory");
        }
        let Some(durable) = &self.inner.durable else {
            return true;
        };
        let entry = CacheEntry::new(key, value, kind, now);
        if let Err(e) = durable.put(&entry).await {
            tracing::warn!(
                key = entry.key,
                store = durable.name(),
                retryable = e.is_retryable(),
                error = ?e,
                "Durable cache write failed; rolling back"
            );
            let mut memory = lock(&self.inner.memory);
            // Leave the slot alone if a newer write replaced ours meanwhile.
            let ours = memory
                .peek(&entry.key)
                .is_some_and(|current| current.created_at == now && current.value == entry.value);
            if ours {
                memory.remove(&entry.key);
            }
            return false;
        }
        self.schedule_cleanup();
        true
    }

    /// Remove a single artifact from both tiers.
    pub async fn delete(&self, key: &str) {
        lock(&self.inner.memory).remove(key);
        self.inner.invalidations.fetch_add(1, Ordering::SeqCst);
        if let Some(durable) = &self.inner.durable
            && let Err(e) = durable.delete(key).await
        {
            tracing::warn!(
                key,
                store = durable.name(),
                retryable = e.is_retryable(),
                error = ?e,
                "Durable cache delete failed"
            );
        }
    }

    /// Remove every artifact from both tiers. Hit/miss counters are kept.
    pub async fn clear(&self) {
        lock(&self.inner.memory).clear();
        self.inner.invalidations.fetch_add(1, Ordering::SeqCst);
        if let Some(durable) = &self.inner.durable
            && let Err(e) = durable.clear().await
        {
            tracing::warn!(
                store = durable.name(),
                retryable = e.is_retryable(),
                error = ?e,
                "Durable cache clear failed"
            );
        }
    }

    /// Whether `key` is currently held in memory. Doesn't affect recency.
    pub fn contains_in_memory(&self, key: &str) -> bool {
        lock(&self.inner.memory).contains(key)
    }

    /// Describe a cached artifact without promoting it or counting a lookup.
    pub async fn inspect(&self, key: &str) -> Option<EntryInfo> {
        let memory = lock(&self.inner.memory).peek(key).map(|entry| EntryInfo {
            tier: Tier::Memory,
            kind: entry.kind.clone(),
            size_bytes: entry.value.len() as u64,
            created_at: entry.created_at,
            last_accessed_at: entry.last_accessed_at,
        });
        if memory.is_some() {
            return memory;
        }
        let durable = self.inner.durable.as_ref()?;
        match durable.get(key).await {
            Ok(entry) => entry.map(|entry| EntryInfo {
                tier: Tier::Durable,
                kind: entry.kind,
                size_bytes: entry.size_bytes,
                created_at: entry.created_at,
                last_accessed_at: entry.last_accessed_at,
            }),
            Err(e) => {
                tracing::warn!(
                    key,
                    store = durable.name(),
                    retryable = e.is_retryable(),
                    error = ?e,
                    "Durable cache read failed"
                );
                None
            },
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let tier1 = {
            let memory = lock(&self.inner.memory);
            MemoryStats {
                count: memory.len(),
                capacity: memory.capacity(),
                total_bytes: memory.total_bytes(),
            }
        };
        let capacity = self.inner.config.durable_capacity;
        let unavailable = DurableStats { available: false, count: 0, capacity, total_bytes: 0 };
        let tier2 = match &self.inner.durable {
            None => unavailable,
            Some(durable) => match (durable.count().await, durable.total_bytes().await) {
                (Ok(count), Ok(total_bytes)) => DurableStats { available: true, count, capacity, total_bytes },
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(
                        store = durable.name(),
                        retryable = e.is_retryable(),
                        error = ?e,
                        "Durable cache statistics unavailable"
                    );
                    unavailable
                },
            },
        };
        let combined =
            CombinedStats::new(self.inner.hits.load(Ordering::Relaxed), self.inner.misses.load(Ordering::Relaxed));
        CacheStats { tier1, tier2, combined }
    }

    /// Kick off a background cleanup pass unless one is already scheduled or
    /// running; triggers that arrive meanwhile fold into that pass.
    fn schedule_cleanup(&self) {
        if self.inner.durable.is_none() {
            return;
        }
        // Raised before the claim, so a pass that is about to release the
        // flag sees it and goes round once more.
        self.inner.cleanup_rerun.store(true, Ordering::SeqCst);
        if self.inner.cleanup_pending.swap(true, Ordering::SeqCst) {
            tracing::trace!("Durable cleanup already pending");
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.inner.cleanup_pending.store(false, Ordering::SeqCst);
            tracing::warn!("No Tokio runtime to run durable cache cleanup on; skipping");
            return;
        };
        let inner = Arc::clone(&self.inner);
        let handle = runtime.spawn(async move {
            tokio::time::sleep(inner.config.cleanup_delay()).await;
            inner.run_cleanup().await;
        });
        let mut tasks = lock(&self.inner.cleanup_tasks);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Run an eviction pass now, returning how many durable entries it
    /// removed. Waits for a pass that is already running to finish first.
    pub async fn prune(&self) -> u64 {
        let _pass = self.inner.pass.lock().await;
        self.inner.evict_overflow().await
    }

    /// Wait until no background cleanup pass is scheduled or running.
    pub async fn wait_for_cleanup(&self) {
        loop {
            let handles = std::mem::take(&mut *lock(&self.inner.cleanup_tasks));
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "Durable cleanup task did not finish");
                }
            }
        }
    }
}

impl Inner {
    /// Evict until the durable tier is within capacity, then release the
    /// cleanup flag.
    ///
    /// The flag stays claimed for the whole pass. Writes that land meanwhile
    /// only raise `cleanup_rerun`, and the pass evicts again for them instead
    /// of a second pass being spawned.
    #[instrument("durable cache cleanup", skip(self))]
    async fn run_cleanup(&self) {
        let _pass = self.pass.lock().await;
        let mut removed = 0;
        loop {
            self.cleanup_rerun.store(false, Ordering::SeqCst);
            removed += self.evict_overflow().await;
            if self.cleanup_rerun.load(Ordering::SeqCst) {
                continue;
            }
            self.cleanup_pending.store(false, Ordering::SeqCst);
            // A trigger can slip in between the check above and the release.
            // Take the flag back for it unless a newer pass already has.
            if !self.cleanup_rerun.load(Ordering::SeqCst) || self.cleanup_pending.swap(true, Ordering::SeqCst) {
                break;
            }
        }
        tracing::debug!(removed, "Durable cache cleanup finished");
    }

    async fn evict_overflow(&self) -> u64 {
        let Some(durable) = &self.durable else {
            return 0;
        };
        let count = match durable.count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(
                    store = durable.name(),
                    retryable = e.is_retryable(),
                    error = ?e,
                    "Could not count durable cache entries"
                );
                return 0;
            },
        };
        let capacity = self.config.durable_capacity;
        if count <= capacity {
            return 0;
        }
        let result = match durable.oldest_keys(count - capacity).await {
            Ok(keys) => durable.delete_many(&keys).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(removed) => {
                tracing::debug!(removed, count, capacity, "Evicted oldest durable cache entries");
                removed
            },
            Err(e) => {
                tracing::warn!(
                    store = durable.name(),
                    retryable = e.is_retryable(),
                    error = ?e,
                    "Durable cache cleanup failed"
                );
                0
            },
        }
    }
}
