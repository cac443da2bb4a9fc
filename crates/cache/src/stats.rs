//! Point-in-time cache statistics.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub tier1: MemoryStats,
    pub tier2: DurableStats,
    pub combined: CombinedStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub count: usize,
    pub capacity: usize,
    pub total_bytes: u64,
}

/// Durable tier figures. `available` is `false` when the cache runs
/// memory-only or the store couldn't be queried; counts are zero then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DurableStats {
    pub available: bool,
    pub count: u64,
    pub capacity: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedStats {
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, or `0.0` before the first lookup.
    pub hit_ratio: f64,
}
impl CombinedStats {
    pub(crate) fn new(hits: u64, misses: u64) -> Self {
        let lookups = hits + misses;
        let hit_ratio = if lookups == 0 { 0.0 } else { hits as f64 / lookups as f64 };
        Self { hits, misses, hit_ratio }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "memory:  {}/{} entries, {} bytes",
            self.tier1.count, self.tier1.capacity, self.tier1.total_bytes
        )?;
        if self.tier2.available {
            writeln!(
                f,
                "durable: {}/{} entries, {} bytes",
                self.tier2.count, self.tier2.capacity, self.tier2.total_bytes
            )?;
        } else {
            writeln!(f, "durable: unavailable")?;
        }
        write!(
            f,
            "lookups: {} hits, {} misses ({:.1}% hit ratio)",
            self.combined.hits,
            self.combined.misses,
            self.combined.hit_ratio * 100.0
        )
    }
}
