use bytes::Bytes;

use cask_types::{BlobKind, ContentHasher};

use crate::error::{CodecError, CodecResult};
use crate::handle::{BlobHandle, BlobLocator, BlobNode};
use crate::record::{encode_record, encode_varint, AliasSpec};

/// Accumulates one blob: payload bytes, imports, and alias registrations.
///
/// Payload regions are appended either fixed-length ([`put`](Self::put)) or
/// varint length-prefixed ([`put_prefixed`](Self::put_prefixed)); the
/// matching reader is [`crate::PayloadReader`]. Imports must be added in
/// the order the decoder should see them; duplicates are legal and
/// preserved.
///
/// [`complete`](Self::complete) is pure in-memory: it encodes the record,
/// hashes it, derives the storage key, and returns a resolved handle. The
/// physical write happens on [`BlobHandle::flush`], which lets a tree
/// builder finalize a parent only after its children are durable.
#[derive(Default)]
pub struct BlobWriter {
    payload: Vec<u8>,
    imports: Vec<BlobLocator>,
    aliases: Vec<AliasSpec>,
}

impl BlobWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append fixed-length bytes to the payload.
    pub fn put(&mut self, bytes: &[u8]) {
        self.payload.extend_from_slice(bytes);
    }

    /// Append a varint to the payload.
    pub fn put_varint(&mut self, value: u64) {
        encode_varint(&mut self.payload, value);
    }

    /// Append a varint length prefix followed by the bytes.
    pub fn put_prefixed(&mut self, bytes: &[u8]) {
        encode_varint(&mut self.payload, bytes.len() as u64);
        self.payload.extend_from_slice(bytes);
    }

    /// Record an outward reference to another blob.
    pub fn add_import(&mut self, handle: &BlobHandle) {
        self.imports.push(handle.locator().clone());
    }

    /// Register an alias for this blob, usable for secondary lookup.
    ///
    /// Must be called before [`complete`](Self::complete); aliases are part
    /// of the encoded record and therefore of the content hash.
    pub fn add_alias(&mut self, alias: &str, rank: u32) -> CodecResult<()> {
        if alias.is_empty() {
            return Err(CodecError::InvalidAlias("alias must not be empty".into()));
        }
        self.aliases.push(AliasSpec {
            alias: alias.to_string(),
            rank,
        });
        Ok(())
    }

    /// Current payload length in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Number of imports recorded so far.
    pub fn import_count(&self) -> usize {
        self.imports.len()
    }

    /// Finalize with a content-derived storage key.
    pub fn complete(self, kind: BlobKind) -> CodecResult<BlobHandle> {
        self.complete_inner(kind, None)
    }

    /// Finalize with a caller-supplied logical key (co-located trees).
    pub fn complete_named(self, kind: BlobKind, logical: &str) -> CodecResult<BlobHandle> {
        self.complete_inner(kind, Some(logical))
    }

    fn complete_inner(self, kind: BlobKind, logical: Option<&str>) -> CodecResult<BlobHandle> {
        let encoded = encode_record(&kind, &self.payload, &self.imports, &self.aliases);
        let hash = ContentHasher::RECORD.hash(&encoded);
        let locator = match logical {
            Some(logical) => BlobLocator::named(logical, hash)?,
            None => BlobLocator::for_hash(hash),
        };
        let node = BlobNode::from_parts(
            locator,
            kind,
            Bytes::from(self.payload),
            self.imports,
            self.aliases,
            encoded,
        );
        Ok(BlobHandle::Resolved(node))
    }
}

impl std::fmt::Debug for BlobWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobWriter")
            .field("payload_len", &self.payload.len())
            .field("imports", &self.imports.len())
            .field("aliases", &self.aliases.len())
            .finish()
    }
}
