use cask_store::StoreError;
use thiserror::Error;

/// Errors from ref directory operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The ref does not exist, or existed and has expired.
    #[error("ref not found: {name}")]
    NotFound { name: String },

    /// The ref name is invalid.
    #[error("invalid ref name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// A stored ref record could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Error from the underlying object store.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for ref operations.
pub type RefResult<T> = Result<T, RefError>;
