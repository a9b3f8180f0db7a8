use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::fs::FsObjectStore;
use crate::memory::InMemoryObjectStore;
use crate::traits::ObjectStore;

/// Discriminated backend descriptor, as supplied by configuration.
///
/// The engine constructs an [`ObjectStore`] from any descriptor it is
/// given; kind-specific parameters live on the variant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendSpec {
    /// Volatile in-memory backend, for tests and ephemeral namespaces.
    Memory,
    /// Filesystem backend rooted at the given directory.
    Filesystem { root: PathBuf },
}

/// Construct an object store from a backend descriptor.
pub fn open_backend(spec: &BackendSpec) -> StoreResult<Arc<dyn ObjectStore>> {
    match spec {
        BackendSpec::Memory => Ok(Arc::new(InMemoryObjectStore::new())),
        BackendSpec::Filesystem { root } => Ok(Arc::new(FsObjectStore::open(root)?)),
    }
}
