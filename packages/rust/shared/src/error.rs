//! Error types for lexsync.
//!
//! Library crates use [`LexsyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all lexsync operations.
#[derive(Debug, thiserror::Error)]
pub enum LexsyncError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A source record could not be decoded.
    #[error("parse error in {source_name}{}: {message}", line.map(|l| format!(" line {l}")).unwrap_or_default())]
    Parse {
        source_name: String,
        line: Option<usize>,
        message: String,
    },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A part of speech that cannot be mapped to a lexeme identity.
    #[error("unsupported part of speech '{pos}' for lemma '{lemma}'")]
    UnsupportedPos { lemma: String, pos: String },

    /// A generated task failed renderer validation.
    #[error("template error for {lexeme_id} ({template}): {message}")]
    Template {
        lexeme_id: String,
        template: String,
        message: String,
    },

    /// The run was cancelled between batches.
    #[error("operation cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LexsyncError>;

impl LexsyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error for a named source, optionally pointing at a line.
    pub fn parse(source_name: impl Into<String>, line: Option<usize>, msg: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            line,
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

    /// Wrap any storage-layer error.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}
