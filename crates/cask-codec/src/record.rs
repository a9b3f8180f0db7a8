//! The framed binary record format.
//!
//! On-disk layout:
//!
//! ```text
//! [4 bytes: magic "CBR1"]
//! [varint: kind ident length] [ident bytes (UTF-8)]
//! [varint: kind schema version]
//! [varint: payload length] [payload bytes]
//! [varint: import count]
//!     per import: [varint: key length] [key bytes] [32 bytes: content hash]
//! [varint: alias count]
//!     per alias: [varint: alias length] [alias bytes] [varint: rank]
//! [4 bytes: CRC32 of everything above (little-endian)]
//! ```
//!
//! The CRC trailer guards frame integrity; content identity is the
//! domain-separated BLAKE3 of the whole frame, computed by the writer.

use bytes::Bytes;

use cask_types::{BlobKind, ContentHash};

use crate::error::{CodecError, CodecResult};
use crate::handle::BlobLocator;

/// Record magic: "cask blob record", format revision 1.
pub const MAGIC: &[u8; 4] = b"CBR1";

/// An alias registration carried inside a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AliasSpec {
    /// The alias string.
    pub alias: String,
    /// Rank for ordering lookups; lower ranks sort first.
    pub rank: u32,
}

/// A fully parsed record, before any locator is attached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRecord {
    /// Kind tag describing the payload schema.
    pub kind: BlobKind,
    /// The raw payload region.
    pub payload: Bytes,
    /// Outward references, in serialized order (duplicates preserved).
    pub imports: Vec<BlobLocator>,
    /// Alias registrations, in serialized order.
    pub aliases: Vec<AliasSpec>,
}

/// Encode a record frame from its parts.
pub fn encode_record(
    kind: &BlobKind,
    payload: &[u8],
    imports: &[BlobLocator],
    aliases: &[AliasSpec],
) -> Bytes {
    let mut buf = Vec::with_capacity(payload.len() + 64);
    buf.extend_from_slice(MAGIC);

    encode_varint(&mut buf, kind.ident().len() as u64);
    buf.extend_from_slice(kind.ident().as_bytes());
    encode_varint(&mut buf, u64::from(kind.version()));

    encode_varint(&mut buf, payload.len() as u64);
    buf.extend_from_slice(payload);

    encode_varint(&mut buf, imports.len() as u64);
    for import in imports {
        encode_varint(&mut buf, import.key.len() as u64);
        buf.extend_from_slice(import.key.as_bytes());
        buf.extend_from_slice(import.hash.as_bytes());
    }

    encode_varint(&mut buf, aliases.len() as u64);
    for alias in aliases {
        encode_varint(&mut buf, alias.alias.len() as u64);
        buf.extend_from_slice(alias.alias.as_bytes());
        encode_varint(&mut buf, u64::from(alias.rank));
    }

    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Bytes::from(buf)
}

/// Decode a record frame, verifying magic and CRC.
pub fn decode_record(data: &Bytes) -> CodecResult<RawRecord> {
    if data.len() < MAGIC.len() + 4 {
        return Err(CodecError::Truncated("frame shorter than header".into()));
    }
    if !data.starts_with(MAGIC) {
        return Err(CodecError::BadMagic);
    }

    let body_end = data.len() - 4;
    let expected = u32::from_le_bytes(
        data[body_end..]
            .try_into()
            .expect("trailer is exactly 4 bytes"),
    );
    let actual = crc32fast::hash(&data[..body_end]);
    if expected != actual {
        return Err(CodecError::ChecksumMismatch { expected, actual });
    }

    let mut reader = PayloadReader::new(data.slice(MAGIC.len()..body_end));

    let ident_bytes = reader.read_prefixed()?;
    let ident = std::str::from_utf8(&ident_bytes)
        .map_err(|_| CodecError::Truncated("kind ident is not UTF-8".into()))?;
    let version = reader.read_varint()?;
    let kind = BlobKind::new(ident, version as u32)?;

    let payload = reader.read_prefixed()?;

    let import_count = reader.read_varint()?;
    let mut imports = Vec::with_capacity(import_count as usize);
    for _ in 0..import_count {
        let key_bytes = reader.read_prefixed()?;
        let key = std::str::from_utf8(&key_bytes)
            .map_err(|_| CodecError::Truncated("import key is not UTF-8".into()))?
            .to_string();
        let hash_bytes = reader.read_bytes(32)?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&hash_bytes);
        imports.push(BlobLocator {
            key,
            hash: ContentHash::from_raw(hash),
        });
    }

    let alias_count = reader.read_varint()?;
    let mut aliases = Vec::with_capacity(alias_count as usize);
    for _ in 0..alias_count {
        let alias_bytes = reader.read_prefixed()?;
        let alias = std::str::from_utf8(&alias_bytes)
            .map_err(|_| CodecError::Truncated("alias is not UTF-8".into()))?
            .to_string();
        let rank = reader.read_varint()? as u32;
        aliases.push(AliasSpec { alias, rank });
    }

    if !reader.is_empty() {
        return Err(CodecError::Truncated(format!(
            "{} trailing bytes after record body",
            reader.remaining()
        )));
    }

    Ok(RawRecord {
        kind,
        payload,
        imports,
        aliases,
    })
}

/// Cursor over a byte region for structured decoding.
///
/// Used both by the frame decoder and by kind-specific payload
/// deserializers (the tree builder reads its file/directory payloads
/// through one of these).
#[derive(Clone, Debug)]
pub struct PayloadReader {
    data: Bytes,
    pos: usize,
}

impl PayloadReader {
    /// Wrap a byte region.
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns `true` if the cursor is at the end.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read exactly `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> CodecResult<Bytes> {
        if self.remaining() < n {
            return Err(CodecError::Truncated(format!(
                "wanted {n} bytes, {} remain",
                self.remaining()
            )));
        }
        let out = self.data.slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(out)
    }

    /// Read a variable-length integer.
    pub fn read_varint(&mut self) -> CodecResult<u64> {
        let (value, consumed) = decode_varint(&self.data[self.pos..])?;
        self.pos += consumed;
        Ok(value)
    }

    /// Read a varint length prefix followed by that many bytes.
    pub fn read_prefixed(&mut self) -> CodecResult<Bytes> {
        let len = self.read_varint()?;
        self.read_bytes(len as usize)
    }
}

/// Encode a u64 as a variable-length integer.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a variable-length integer. Returns (value, bytes_consumed).
pub(crate) fn decode_varint(data: &[u8]) -> CodecResult<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        if shift >= 64 {
            return Err(CodecError::Truncated("varint overflow".into()));
        }
    }
    Err(CodecError::Truncated("truncated varint".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind() -> BlobKind {
        BlobKind::new("test-kind", 1).unwrap()
    }

    fn locator(n: u8) -> BlobLocator {
        BlobLocator::for_hash(ContentHash::from_raw([n; 32]))
    }

    #[test]
    fn varint_roundtrip_small() {
        let mut buf = Vec::new();
        encode_varint(&mut buf, 42);
        let (val, consumed) = decode_varint(&buf).unwrap();
        assert_eq!(val, 42);
        assert_eq!(consumed, 1);
    }

    #[test]
    fn varint_roundtrip_large() {
        let mut buf = Vec::new();
        encode_varint(&mut buf, 1_000_000);
        let (val, _) = decode_varint(&buf).unwrap();
        assert_eq!(val, 1_000_000);
    }

    #[test]
    fn varint_max_u64() {
        let mut buf = Vec::new();
        encode_varint(&mut buf, u64::MAX);
        let (val, _) = decode_varint(&buf).unwrap();
        assert_eq!(val, u64::MAX);
    }

    #[test]
    fn decode_varint_truncated() {
        let err = decode_varint(&[0x80]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated(_)));
    }

    #[test]
    fn record_roundtrip_empty() {
        let encoded = encode_record(&kind(), b"", &[], &[]);
        let raw = decode_record(&encoded).unwrap();
        assert_eq!(raw.kind, kind());
        assert!(raw.payload.is_empty());
        assert!(raw.imports.is_empty());
        assert!(raw.aliases.is_empty());
    }

    #[test]
    fn record_roundtrip_full() {
        let imports = vec![locator(1), locator(2), locator(1)];
        let aliases = vec![
            AliasSpec {
                alias: "release/latest".into(),
                rank: 2,
            },
            AliasSpec {
                alias: "nightly".into(),
                rank: 1,
            },
        ];
        let encoded = encode_record(&kind(), b"payload bytes", &imports, &aliases);
        let raw = decode_record(&encoded).unwrap();
        assert_eq!(&raw.payload[..], b"payload bytes");
        assert_eq!(raw.imports, imports);
        assert_eq!(raw.aliases, aliases);
    }

    #[test]
    fn duplicate_imports_preserved_in_order() {
        let imports = vec![locator(7), locator(7)];
        let encoded = encode_record(&kind(), b"x", &imports, &[]);
        let raw = decode_record(&encoded).unwrap();
        assert_eq!(raw.imports.len(), 2);
        assert_eq!(raw.imports[0], raw.imports[1]);
    }

    #[test]
    fn encoding_is_deterministic() {
        let imports = vec![locator(3)];
        let a = encode_record(&kind(), b"same", &imports, &[]);
        let b = encode_record(&kind(), b"same", &imports, &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn bad_magic_detected() {
        let mut bytes = encode_record(&kind(), b"x", &[], &[]).to_vec();
        bytes[0] = b'X';
        let err = decode_record(&Bytes::from(bytes)).unwrap_err();
        assert!(matches!(err, CodecError::BadMagic));
    }

    #[test]
    fn corruption_detected_by_crc() {
        let mut bytes = encode_record(&kind(), b"payload", &[], &[]).to_vec();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        let err = decode_record(&Bytes::from(bytes)).unwrap_err();
        assert!(matches!(err, CodecError::ChecksumMismatch { .. }));
    }

    #[test]
    fn truncation_detected() {
        let bytes = encode_record(&kind(), b"payload", &[], &[]);
        let cut = bytes.slice(..bytes.len() - 6);
        let err = decode_record(&cut).unwrap_err();
        // Either the CRC no longer matches or a field runs out of bytes;
        // both are format errors, never NotFound.
        assert!(matches!(
            err,
            CodecError::ChecksumMismatch { .. } | CodecError::Truncated(_)
        ));
    }

    #[test]
    fn tiny_frame_is_truncated() {
        let err = decode_record(&Bytes::from_static(b"CB")).unwrap_err();
        assert!(matches!(err, CodecError::Truncated(_)));
    }

    #[test]
    fn payload_reader_prefixed_fields() {
        let mut buf = Vec::new();
        encode_varint(&mut buf, 3);
        buf.extend_from_slice(b"abc");
        encode_varint(&mut buf, 300);
        let mut reader = PayloadReader::new(Bytes::from(buf));
        assert_eq!(&reader.read_prefixed().unwrap()[..], b"abc");
        assert_eq!(reader.read_varint().unwrap(), 300);
        assert!(reader.is_empty());
    }

    #[test]
    fn payload_reader_underflow() {
        let mut reader = PayloadReader::new(Bytes::from_static(b"ab"));
        let err = reader.read_bytes(3).unwrap_err();
        assert!(matches!(err, CodecError::Truncated(_)));
    }
}
