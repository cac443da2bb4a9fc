use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use time::UtcDateTime;

/// A rendered artifact as stored in the durable tier.
///
/// Two entries with the same `key` are interchangeable: the key is always a
/// [`digest`](crate::digest) of the kind, content and visual configuration
/// that produced `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub kind: String,
    pub size_bytes: u64,
    pub created_at: UtcDateTime,
    pub last_accessed_at: UtcDateTime,
}
impl CacheEntry {
    /// Create a fresh entry; both timestamps are set to `now`.
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>, kind: impl Into<String>, now: UtcDateTime) -> Self {
        let value = value.into();
        Self {
            key: key.into(),
            size_bytes: value.len() as u64,
            value,
            kind: kind.into(),
            created_at: now,
            last_accessed_at: now,
        }
    }
}

/// Milliseconds since the Unix epoch. Second resolution would make every
/// entry written during a burst tie on recency.
pub(crate) fn unix_millis(at: UtcDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

fn from_unix_millis(millis: i64, field: &'static str) -> Result<UtcDateTime, Error> {
    UtcDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).or_raise(|| ErrorKind::InvalidData(field))
}

#[derive(sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub(crate) key: String,
    pub(crate) kind: String,
    pub(crate) value: Vec<u8>,
    pub(crate) size_bytes: i64,
    pub(crate) created_at: i64,
    pub(crate) last_accessed_at: i64,
}
impl TryFrom<&CacheEntry> for EntryRow {
    type Error = Error;
    fn try_from(entry: &CacheEntry) -> Result<Self, Self::Error> {
        Ok(Self {
            key: entry.key.clone(),
            kind: entry.kind.clone(),
            value: entry.value.clone(),
            size_bytes: i64::try_from(entry.size_bytes).or_raise(|| ErrorKind::InvalidData("size"))?,
            created_at: unix_millis(entry.created_at),
            last_accessed_at: unix_millis(entry.last_accessed_at),
        })
    }
}
impl TryFrom<EntryRow> for CacheEntry {
    type Error = Error;
    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            key: row.key,
            kind: row.kind,
            value: row.value,
            size_bytes: u64::try_from(row.size_bytes).or_raise(|| ErrorKind::InvalidData("size"))?,
            created_at: from_unix_millis(row.created_at, "creation date")?,
            last_accessed_at: from_unix_millis(row.last_accessed_at, "last access date")?,
        })
    }
}
