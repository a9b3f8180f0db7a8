use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use cask_store::{validate_key, ObjectStore};
use cask_types::{BlobKind, ContentHash, ContentHasher};

use crate::error::{CodecError, CodecResult};
use crate::record::{decode_record, AliasSpec, PayloadReader};

/// Identifies a blob by storage key and content hash.
///
/// The key is where the bytes live inside a namespace; the hash is what
/// the bytes must verify against when fetched. For ordinary blobs the key
/// is derived from the hash; co-located blobs (large chunked trees) carry
/// a caller-supplied logical key instead.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobLocator {
    /// Storage key within the namespace.
    pub key: String,
    /// Content hash of the encoded record.
    pub hash: ContentHash,
}

impl BlobLocator {
    /// Locator with a content-derived key: `blobs/<h2>/<h62>`.
    ///
    /// The first two hex characters shard the key space so filesystem
    /// backends never collect millions of entries in one directory.
    pub fn for_hash(hash: ContentHash) -> Self {
        let hex = hash.to_hex();
        Self {
            key: format!("blobs/{}/{}", &hex[..2], &hex[2..]),
            hash,
        }
    }

    /// Locator with a caller-supplied logical key under `blobs/named/`.
    pub fn named(logical: &str, hash: ContentHash) -> CodecResult<Self> {
        validate_key(logical)?;
        Ok(Self {
            key: format!("blobs/named/{logical}"),
            hash,
        })
    }
}

impl fmt::Debug for BlobLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobLocator({} @ {})", self.key, self.hash.short_hex())
    }
}

impl fmt::Display for BlobLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.key, self.hash.short_hex())
    }
}

/// A fully decoded blob: locator plus record contents.
///
/// Nodes are shared behind `Arc`; content lifetime is managed by the
/// store, never by the holders of a node.
pub struct BlobNode {
    locator: BlobLocator,
    kind: BlobKind,
    payload: Bytes,
    imports: Vec<BlobLocator>,
    aliases: Vec<AliasSpec>,
    encoded: Bytes,
}

impl BlobNode {
    pub(crate) fn from_parts(
        locator: BlobLocator,
        kind: BlobKind,
        payload: Bytes,
        imports: Vec<BlobLocator>,
        aliases: Vec<AliasSpec>,
        encoded: Bytes,
    ) -> Arc<Self> {
        Arc::new(Self {
            locator,
            kind,
            payload,
            imports,
            aliases,
            encoded,
        })
    }

    /// Decode stored bytes fetched from `key` into a node.
    ///
    /// The locator hash is computed from the bytes themselves; callers who
    /// already hold an expected hash should go through
    /// [`BlobHandle::expand`], which verifies it.
    pub fn decode(key: &str, encoded: Bytes) -> CodecResult<Arc<Self>> {
        let raw = decode_record(&encoded)?;
        let hash = ContentHasher::RECORD.hash(&encoded);
        Ok(Self::from_parts(
            BlobLocator {
                key: key.to_string(),
                hash,
            },
            raw.kind,
            raw.payload,
            raw.imports,
            raw.aliases,
            encoded,
        ))
    }

    /// The node's locator.
    pub fn locator(&self) -> &BlobLocator {
        &self.locator
    }

    /// The kind tag.
    pub fn kind(&self) -> &BlobKind {
        &self.kind
    }

    /// The raw payload region.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// A cursor over the payload for structured decoding.
    pub fn payload_reader(&self) -> PayloadReader {
        PayloadReader::new(self.payload.clone())
    }

    /// Import locators in serialized order (duplicates preserved).
    pub fn imports(&self) -> &[BlobLocator] {
        &self.imports
    }

    /// One lazy handle per import, in order.
    pub fn import_handles(&self) -> Vec<BlobHandle> {
        self.imports
            .iter()
            .map(|loc| BlobHandle::Lazy(loc.clone()))
            .collect()
    }

    /// Alias registrations carried by this record.
    pub fn aliases(&self) -> &[AliasSpec] {
        &self.aliases
    }

    /// The encoded frame.
    pub fn encoded(&self) -> &Bytes {
        &self.encoded
    }

    /// Fail with [`CodecError::KindMismatch`] unless the node has the
    /// expected kind.
    pub fn expect_kind(&self, expected: &BlobKind) -> CodecResult<()> {
        if &self.kind != expected {
            return Err(CodecError::KindMismatch {
                expected: expected.clone(),
                actual: self.kind.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for BlobNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobNode")
            .field("locator", &self.locator)
            .field("kind", &self.kind)
            .field("payload_len", &self.payload.len())
            .field("imports", &self.imports.len())
            .finish()
    }
}

/// A reference to a located blob: resolved (content in memory) or lazy
/// (content fetched on demand).
///
/// The two states are explicit — expansion is always a visible `await`,
/// never a property access that hides I/O.
#[derive(Clone)]
pub enum BlobHandle {
    /// Content already decoded.
    Resolved(Arc<BlobNode>),
    /// Known only by locator.
    Lazy(BlobLocator),
}

impl BlobHandle {
    /// A lazy handle for a locator.
    pub fn lazy(locator: BlobLocator) -> Self {
        Self::Lazy(locator)
    }

    /// The locator, available in both states.
    pub fn locator(&self) -> &BlobLocator {
        match self {
            Self::Resolved(node) => node.locator(),
            Self::Lazy(loc) => loc,
        }
    }

    /// Returns `true` if content is already in memory.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Fetch and decode the target if lazy; no-op if already resolved.
    ///
    /// Verifies that the fetched bytes hash to the locator's hash before
    /// decoding; a mismatch is corruption, reported as
    /// [`CodecError::HashMismatch`], never conflated with NotFound.
    pub async fn expand(&self, store: &dyn ObjectStore) -> CodecResult<Arc<BlobNode>> {
        match self {
            Self::Resolved(node) => Ok(node.clone()),
            Self::Lazy(loc) => {
                let encoded = store.read(&loc.key).await?;
                let actual = ContentHasher::RECORD.hash(&encoded);
                if actual != loc.hash {
                    return Err(CodecError::HashMismatch {
                        key: loc.key.clone(),
                        expected: loc.hash,
                        actual,
                    });
                }
                let raw = decode_record(&encoded)?;
                Ok(BlobNode::from_parts(
                    loc.clone(),
                    raw.kind,
                    raw.payload,
                    raw.imports,
                    raw.aliases,
                    encoded,
                ))
            }
        }
    }

    /// Force the physical write of a resolved handle's record.
    ///
    /// Idempotent under content addressing: rewriting a key with identical
    /// bytes is indistinguishable from the first write. Lazy handles are
    /// already durable (they can only come from stored records), so this
    /// is a no-op for them.
    pub async fn flush(&self, store: &dyn ObjectStore) -> CodecResult<()> {
        if let Self::Resolved(node) = self {
            store
                .write(&node.locator.key, node.encoded.clone())
                .await?;
        }
        Ok(())
    }
}

impl PartialEq for BlobHandle {
    /// Handles compare by locator identity, regardless of resolution state.
    fn eq(&self, other: &Self) -> bool {
        self.locator() == other.locator()
    }
}

impl Eq for BlobHandle {}

impl fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(node) => write!(f, "BlobHandle::Resolved({})", node.locator()),
            Self::Lazy(loc) => write!(f, "BlobHandle::Lazy({loc})"),
        }
    }
}
