//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! None of these escape [`RenderCache`](crate::RenderCache): durable tier
//! failures are logged and degraded to a miss or a dropped write. They are
//! public for callers that talk to a [`DurableStore`](crate::DurableStore)
//! directly (administration tooling, tests).

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// The durable tier could not be reached (closed pool, injected failure).
    #[display("durable cache tier unavailable")]
    Unavailable,
    /// Stored data could not be converted back into a cache entry.
    #[display("invalid cache data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// Configuration values that make the cache unusable.
    #[display("invalid cache configuration: {_0}")]
    InvalidConfig(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database | Self::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exn::ResultExt;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::InvalidData("size").to_string(), "invalid cache data: size");
        assert_eq!(ErrorKind::Unavailable.to_string(), "durable cache tier unavailable");
    }

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::Unavailable.is_retryable());
        assert!(!ErrorKind::Migration.is_retryable());
        assert!(!ErrorKind::InvalidConfig("memory_capacity").is_retryable());
    }

    #[test]
    fn error_from_result() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::other("disk on fire"));
        let err: Result<()> = result.or_raise(|| ErrorKind::Database);
        assert!(matches!(&*err.unwrap_err(), ErrorKind::Database));
    }
}
