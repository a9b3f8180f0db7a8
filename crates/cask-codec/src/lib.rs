//! Blob codec and reference graph for cask.
//!
//! A blob is an immutable, kind-tagged byte record: payload, outward
//! references ("imports") to other blobs, and optional string aliases. This
//! crate owns the wire format of that record, the writer that accumulates
//! one, and the handle abstraction that lets a reader traverse a graph of
//! blobs without materializing it.
//!
//! # The record
//!
//! A self-describing binary frame: magic, kind identifier + schema version,
//! payload region, serialized import locators, alias registrations, and a
//! CRC32 trailer. The content hash is a domain-separated BLAKE3 over the
//! whole frame, so identical content always lands at the same locator.
//!
//! # Lazy handles
//!
//! Decoding a record yields one [`BlobHandle::Lazy`] per import: a locator
//! that resolves to a full [`BlobNode`] only when [`BlobHandle::expand`] is
//! called. Traversal of a million-node tree therefore never loads a blob
//! just to learn its children's locators.
//!
//! # Deferred writes
//!
//! [`BlobWriter::complete`] is pure in-memory: it encodes, hashes, and
//! derives the storage key. [`BlobHandle::flush`] performs the physical
//! write; under content addressing flushing twice is harmless.

pub mod alias;
pub mod error;
pub mod handle;
pub mod record;
pub mod writer;

pub use alias::{AliasDirectory, AliasMatch};
pub use error::{CodecError, CodecResult};
pub use handle::{BlobHandle, BlobLocator, BlobNode};
pub use record::{decode_record, encode_record, AliasSpec, PayloadReader, RawRecord};
pub use writer::BlobWriter;
