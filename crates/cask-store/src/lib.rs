//! Byte-level object storage backends for cask.
//!
//! An [`ObjectStore`] is one namespace's physical storage: a flat space of
//! slash-separated keys, each naming an immutable byte sequence. The engine
//! layers content addressing, refs, and garbage collection on top; this
//! crate only moves bytes.
//!
//! # Backends
//!
//! - [`FsObjectStore`] — objects live at `<root>/<key>`, written to a
//!   hidden temporary file and atomically renamed into place
//! - [`InMemoryObjectStore`] — `BTreeMap` behind a `RwLock`, for tests and
//!   embedding
//! - [`PrefixedObjectStore`] — decorator that multiplexes several logical
//!   namespaces onto one shared backend by key-prefixing
//!
//! # Design Rules
//!
//! 1. A write is atomic from a reader's perspective: a concurrent reader
//!    sees either the whole object or `NotFound`, never a partial write.
//! 2. Writers racing on the same key are tolerated; under content
//!    addressing both carry identical bytes, so the loser's rename is
//!    equivalent to the winner's.
//! 3. Enumeration is keyset-paginated: keys ascend, and a page is resumed
//!    by passing the last key back as `start_after`.
//! 4. The store never interprets object contents.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod backend;
pub mod error;
pub mod fs;
pub mod memory;
pub mod prefix;
pub mod traits;

pub use backend::{open_backend, BackendSpec};
pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use prefix::PrefixedObjectStore;
pub use traits::{collect_prefix, validate_key, ObjectMeta, ObjectStore};
