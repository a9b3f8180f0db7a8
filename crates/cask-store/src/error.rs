use thiserror::Error;

/// Errors from object store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested key does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The key is malformed (empty, traversal, bad separators).
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// A requested byte range lies outside the object.
    #[error("range out of bounds for {key}: offset {offset} + len {len} > size {size}")]
    RangeOutOfBounds {
        key: String,
        offset: u64,
        len: u64,
        size: u64,
    },

    /// I/O failure from the underlying storage backend.
    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
