//! Error types for ScholarScout.
//!
//! Library crates use [`ScholarScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ScholarScout operations.
#[derive(Debug, thiserror::Error)]
pub enum ScholarScoutError {
    /// Configuration loading or validation error. Also raised when no search
    /// provider is usable, which is the only error a fetch cycle surfaces.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during search or link verification.
    #[error("network error: {0}")]
    Network(String),

    /// Provider output or response envelope could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Upstream search provider returned an error response.
    #[error("provider error: {0}")]
    Provider(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (untrusted link at write time, bad identifiers, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScholarScoutError>;

impl ScholarScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this is a fatal configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ScholarScoutError::config("no search provider is configured");
        assert_eq!(
            err.to_string(),
            "config error: no search provider is configured"
        );
        assert!(err.is_config());

        let err = ScholarScoutError::validation("link https://x.com/a is not trusted");
        assert!(err.to_string().contains("not trusted"));
        assert!(!err.is_config());
    }
}
