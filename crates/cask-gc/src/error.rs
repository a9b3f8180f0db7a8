use cask_codec::CodecError;
use cask_refs::RefError;
use cask_store::StoreError;
use cask_types::Timestamp;
use thiserror::Error;

/// Errors from garbage collection.
#[derive(Debug, Error)]
pub enum GcError {
    /// Another collector instance holds the namespace's lease.
    #[error("namespace lease held by {owner} until {expires_at}")]
    LeaseHeld {
        owner: String,
        expires_at: Timestamp,
    },

    /// The cycle was cancelled; nothing further was deleted.
    #[error("gc cycle cancelled")]
    Cancelled,

    /// A lease record could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Error reading roots from the ref directory.
    #[error(transparent)]
    Refs(#[from] RefError),

    /// Error walking the blob graph.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Error from the underlying object store.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for GC operations.
pub type GcResult<T> = Result<T, GcError>;
