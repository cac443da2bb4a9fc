//! Pipeline Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Renderers report failures with these; the task manager catches them per
//! task and turns them into an inline error marker, so a failing renderer
//! never takes its sibling tasks down with it.

use derive_more::{Display, Error};

/// A pipeline error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
/// What a [`Renderer`](crate::Renderer) returns when it can't produce markup.
pub type RenderError = Error;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The payload is missing something the renderer needs.
    #[display("invalid payload: {_0}")]
    InvalidPayload(#[error(not(source))] &'static str),
    /// The renderer itself failed; the message is shown to the reader.
    #[display("{_0}")]
    Render(#[error(not(source))] String),
    /// A renderer backend could not be reached.
    #[display("renderer unavailable")]
    Unavailable,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::InvalidPayload("code").to_string(), "invalid payload: code");
        assert_eq!(ErrorKind::Render("syntax error on line 2".into()).to_string(), "syntax error on line 2");
    }

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::Unavailable.is_retryable());
        assert!(!ErrorKind::InvalidPayload("code").is_retryable());
    }
}
