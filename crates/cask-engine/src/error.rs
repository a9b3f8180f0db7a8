use cask_codec::CodecError;
use cask_gc::GcError;
use cask_refs::RefError;
use cask_store::StoreError;
use cask_tree::TreeError;
use cask_types::TypeError;
use thiserror::Error;

/// Errors surfaced by the engine's client operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No namespace with this id was configured.
    #[error("unknown namespace: {0}")]
    UnknownNamespace(String),

    /// Two configured namespaces share an id.
    #[error("duplicate namespace id: {0}")]
    DuplicateNamespace(String),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Refs(#[from] RefError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Gc(#[from] GcError),
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
