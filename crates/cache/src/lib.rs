//! Two-tier cache for rendered document artifacts.
//!
//! Rendering a diagram or a formula is expensive, and the same source is
//! rendered over and over as a document is edited. This crate keeps the
//! results keyed by a content [`digest`] so an unchanged block never renders
//! twice, even across restarts.
//!
//! # Architecture
//! - **Tier 1** is a strict LRU in process memory, bounded by entry count.
//! - **Tier 2** is a [`DurableStore`], normally the SQLite-backed
//!   [`SqliteStore`]. It's allowed to overflow briefly; a coalesced
//!   background pass evicts the least recently accessed entries until it is
//!   back within capacity.
//!
//! The cache is an optimization, never a source of truth: every durable
//! failure degrades to a miss and a log line.

mod cache;
mod config;
mod db;
mod durable;
pub mod error;
mod hash;
mod memory;
mod models;
mod stats;

pub use crate::cache::{EntryInfo, RenderCache, Tier};
pub use crate::config::CacheConfig;
pub use crate::db::Database;
#[cfg(any(test, feature = "mock"))]
pub use crate::durable::MockStore;
pub use crate::durable::{DurableHandle, DurableStore, SqliteStore};
pub use crate::hash::{VisualConfig, canonicalize, digest, source_hash};
pub use crate::models::CacheEntry;
pub use crate::stats::{CacheStats, CombinedStats, DurableStats, MemoryStats};
