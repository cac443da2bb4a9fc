//! CLI Error Types

use derive_more::{Display, Error};

/// A CLI error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for command handlers.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    /// The durable cache tier couldn't be opened or queried.
    #[display("render cache database unavailable")]
    Database,
    #[display("I/O error")]
    Io,
    /// Input given on the command line or stdin is unusable.
    #[display("invalid input: {_0}")]
    InvalidInput(#[error(not(source))] &'static str),
    #[display("not cached: {_0}")]
    NotCached(#[error(not(source))] String),
}
