//! Filesystem tree builder and materializer.
//!
//! Turns a real directory into a blob graph and back. Each file becomes
//! either a single blob (small files, stored inline) or a run of
//! content-defined chunks joined by an interior file blob; each directory
//! becomes a blob listing child names against child references. Directory
//! entries are sorted, so two directories with identical contents collapse
//! to the same blob — structural sharing for free.
//!
//! Building is strictly bottom-up: [`DirBuilder::collapse`] flushes every
//! child durably before its parent record is completed, so a parent can
//! never reference an import that is not already stored. Collapsing the
//! same in-memory tree twice yields the same root locator.

pub mod builder;
pub mod chunker;
pub mod error;
pub mod materialize;
pub mod schema;

pub use builder::{build_from_directory, BuildOptions, DirBuilder};
pub use chunker::{Chunk, Chunker, ChunkerConfig};
pub use error::{TreeError, TreeResult};
pub use materialize::{expand_to_directory, MaterializeFailure, MaterializeReport};
pub use schema::{chunk_kind, dir_kind, file_kind, DirBlob, DirEntryKind, FileBlob, FileContent};
