use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Content-addressed identifier for any stored blob.
///
/// A `ContentHash` is the BLAKE3 hash of a blob's encoded record. Identical
/// content always produces the same `ContentHash`, which is what makes blobs
/// deduplicatable and concurrent identical writers race-free.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Compute a `ContentHash` from raw bytes (no domain separation).
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create a `ContentHash` from a pre-computed hash.
    pub fn from_raw(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The null hash (all zeros). Represents "no blob".
    pub const fn null() -> Self {
        Self([0u8; 32])
    }

    /// Returns `true` if this is the null hash.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for ContentHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<ContentHash> for [u8; 32] {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g. `"cask-record-v1"`) that is
/// prepended to every hash computation. This prevents cross-domain hash
/// collisions: a blob record and an unframed byte string with identical
/// bytes produce different hashes.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for encoded blob records.
    pub const RECORD: Self = Self {
        domain: "cask-record-v1",
    };
    /// Hasher for whole-file content identifiers used by the tree builder.
    pub const FILE: Self = Self {
        domain: "cask-file-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ContentHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ContentHash::from_raw(*hasher.finalize().as_bytes())
    }

    /// Verify that data produces the expected hash.
    pub fn verify(&self, data: &[u8], expected: &ContentHash) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_is_deterministic() {
        let data = b"hello world";
        let h1 = ContentHash::from_bytes(data);
        let h2 = ContentHash::from_bytes(data);
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_data_produces_different_hashes() {
        let h1 = ContentHash::from_bytes(b"hello");
        let h2 = ContentHash::from_bytes(b"world");
        assert_ne!(h1, h2);
    }

    #[test]
    fn null_is_all_zeros() {
        let null = ContentHash::null();
        assert!(null.is_null());
        assert_eq!(null.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn hex_roundtrip() {
        let h = ContentHash::from_bytes(b"test");
        let hex = h.to_hex();
        let parsed = ContentHash::from_hex(&hex).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = ContentHash::from_hex("abcd").unwrap_err();
        assert!(matches!(err, TypeError::InvalidLength { .. }));
    }

    #[test]
    fn display_is_full_hex() {
        let h = ContentHash::from_bytes(b"test");
        let display = format!("{h}");
        assert_eq!(display.len(), 64);
        assert_eq!(display, h.to_hex());
    }

    #[test]
    fn serde_roundtrip() {
        let h = ContentHash::from_bytes(b"serde test");
        let json = serde_json::to_string(&h).unwrap();
        let parsed: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn domains_separate_hashes() {
        let data = b"same content";
        let record = ContentHasher::RECORD.hash(data);
        let file = ContentHasher::FILE.hash(data);
        let raw = ContentHash::from_bytes(data);
        assert_ne!(record, file);
        assert_ne!(record, raw);
    }

    #[test]
    fn verify_correct_and_tampered() {
        let data = b"payload";
        let h = ContentHasher::RECORD.hash(data);
        assert!(ContentHasher::RECORD.verify(data, &h));
        assert!(!ContentHasher::RECORD.verify(b"tampered", &h));
    }

    #[test]
    fn custom_domain() {
        let hasher = ContentHasher::new("my-domain-v1");
        assert_ne!(hasher.hash(b"data"), ContentHasher::RECORD.hash(b"data"));
    }
}
