use std::path::PathBuf;

use cask_codec::CodecError;
use thiserror::Error;

/// Errors from tree building and materialization.
#[derive(Debug, Error)]
pub enum TreeError {
    /// Chunker configuration is inconsistent.
    #[error("invalid chunker config: {0}")]
    InvalidConfig(String),

    /// A tree entry name is not usable as a path component.
    #[error("invalid entry name: {0:?}")]
    InvalidEntryName(String),

    /// A blob did not carry the payload shape its kind promised.
    #[error("malformed {kind} payload: {reason}")]
    MalformedPayload { kind: &'static str, reason: String },

    /// The operation was cancelled; partial temporary state was discarded.
    #[error("operation cancelled")]
    Cancelled,

    /// A structural failure during materialization (the root itself, not
    /// one file; per-file failures go in the report instead).
    #[error("materialization failed at {path}: {reason}")]
    Materialize { path: PathBuf, reason: String },

    /// Error from the codec or the store beneath it.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Local filesystem I/O failure while walking or reading input.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
