use cask_store::StoreError;
use cask_types::{BlobKind, ContentHash, TypeError};
use thiserror::Error;

/// Errors from encoding, decoding, and resolving blob records.
///
/// Format errors ([`BadMagic`](CodecError::BadMagic),
/// [`Truncated`](CodecError::Truncated),
/// [`ChecksumMismatch`](CodecError::ChecksumMismatch),
/// [`KindMismatch`](CodecError::KindMismatch)) are deliberately distinct
/// from a missing object, which surfaces as
/// [`Store(StoreError::NotFound)`](CodecError::Store): corruption is an
/// operational problem, absence is a normal outcome.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The record does not start with the expected magic bytes.
    #[error("bad record magic")]
    BadMagic,

    /// The record ended before a complete field could be read.
    #[error("truncated record: {0}")]
    Truncated(String),

    /// The CRC32 trailer does not match the frame contents.
    #[error("record checksum mismatch: expected {expected:08x}, computed {actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// The record's kind tag is not the one the caller asked for.
    #[error("blob kind mismatch: expected {expected}, got {actual}")]
    KindMismatch { expected: BlobKind, actual: BlobKind },

    /// Stored bytes do not hash to the locator that named them.
    #[error("content hash mismatch for {key}: expected {expected}, computed {actual}")]
    HashMismatch {
        key: String,
        expected: ContentHash,
        actual: ContentHash,
    },

    /// An alias registration is malformed.
    #[error("invalid alias: {0}")]
    InvalidAlias(String),

    /// A kind or hash inside the record failed validation.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Serialization failure for an administrative record.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Error from the underlying object store (including NotFound).
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
