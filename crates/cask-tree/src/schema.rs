//! Payload schemas for the three tree blob kinds.
//!
//! - `tree-chunk@v1` — raw chunk bytes as the payload, no imports
//! - `tree-file@v1` — file metadata; content either inline or as chunk
//!   imports in stream order
//! - `tree-dir@v1` — entry names and kinds; imports aligned by index
//!
//! Directory entries are encoded in sorted name order, so identical
//! directories encode to identical records.

use bytes::Bytes;

use cask_codec::{BlobLocator, BlobNode, BlobWriter};
use cask_types::{BlobKind, ContentHash};

use crate::error::{TreeError, TreeResult};

/// Kind tag for chunk blobs.
pub fn chunk_kind() -> BlobKind {
    BlobKind::new("tree-chunk", 1).expect("static kind is valid")
}

/// Kind tag for file blobs.
pub fn file_kind() -> BlobKind {
    BlobKind::new("tree-file", 1).expect("static kind is valid")
}

/// Kind tag for directory blobs.
pub fn dir_kind() -> BlobKind {
    BlobKind::new("tree-dir", 1).expect("static kind is valid")
}

const FILE_FLAG_INLINE: u64 = 0;
const FILE_FLAG_CHUNKED: u64 = 1;

const ENTRY_TAG_FILE: u8 = 0;
const ENTRY_TAG_DIR: u8 = 1;

/// How a file blob carries its content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileContent {
    /// Small file: content inline in the payload.
    Inline(Bytes),
    /// Large file: content split across chunk blobs, in stream order.
    Chunked(Vec<BlobLocator>),
}

/// Decoded `tree-file` blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileBlob {
    /// Total file size in bytes.
    pub size: u64,
    /// Whole-file content identifier, used for deduplication checks.
    pub content_id: ContentHash,
    /// The file's content.
    pub content: FileContent,
}

impl FileBlob {
    /// Encode file metadata into a writer (imports for the chunked case
    /// must already have been added, in order).
    pub fn encode_into(
        writer: &mut BlobWriter,
        size: u64,
        content_id: &ContentHash,
        inline: Option<&[u8]>,
        chunk_count: usize,
    ) {
        match inline {
            Some(content) => {
                writer.put_varint(FILE_FLAG_INLINE);
                writer.put_varint(size);
                writer.put(content_id.as_bytes());
                writer.put_prefixed(content);
            }
            None => {
                writer.put_varint(FILE_FLAG_CHUNKED);
                writer.put_varint(size);
                writer.put(content_id.as_bytes());
                writer.put_varint(chunk_count as u64);
            }
        }
    }

    /// Decode a `tree-file` node.
    pub fn decode(node: &BlobNode) -> TreeResult<Self> {
        node.expect_kind(&file_kind())?;
        let mut r = node.payload_reader();
        let flag = r.read_varint()?;
        let size = r.read_varint()?;
        let id_bytes = r.read_bytes(32)?;
        let mut id = [0u8; 32];
        id.copy_from_slice(&id_bytes);
        let content_id = ContentHash::from_raw(id);

        let content = match flag {
            FILE_FLAG_INLINE => {
                let content = r.read_prefixed()?;
                if content.len() as u64 != size {
                    return Err(TreeError::MalformedPayload {
                        kind: "tree-file",
                        reason: format!(
                            "inline length {} disagrees with size {size}",
                            content.len()
                        ),
                    });
                }
                FileContent::Inline(content)
            }
            FILE_FLAG_CHUNKED => {
                let count = r.read_varint()? as usize;
                if count != node.imports().len() {
                    return Err(TreeError::MalformedPayload {
                        kind: "tree-file",
                        reason: format!(
                            "chunk count {count} disagrees with {} imports",
                            node.imports().len()
                        ),
                    });
                }
                FileContent::Chunked(node.imports().to_vec())
            }
            other => {
                return Err(TreeError::MalformedPayload {
                    kind: "tree-file",
                    reason: format!("unknown content flag {other}"),
                })
            }
        };
        Ok(Self {
            size,
            content_id,
            content,
        })
    }
}

/// Kind of one directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirEntryKind {
    File,
    Dir,
}

/// Decoded `tree-dir` blob: entry names/kinds aligned with the record's
/// imports by index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirBlob {
    /// `(name, kind, child)` per entry, in sorted name order.
    pub entries: Vec<(String, DirEntryKind, BlobLocator)>,
}

impl DirBlob {
    /// Encode directory entries into a writer (imports must be added by
    /// the caller in the same order as the names written here).
    pub fn encode_into(writer: &mut BlobWriter, entries: &[(String, DirEntryKind)]) {
        writer.put_varint(entries.len() as u64);
        for (name, kind) in entries {
            writer.put_prefixed(name.as_bytes());
            writer.put(&[match kind {
                DirEntryKind::File => ENTRY_TAG_FILE,
                DirEntryKind::Dir => ENTRY_TAG_DIR,
            }]);
        }
    }

    /// Decode a `tree-dir` node.
    pub fn decode(node: &BlobNode) -> TreeResult<Self> {
        node.expect_kind(&dir_kind())?;
        let mut r = node.payload_reader();
        let count = r.read_varint()? as usize;
        if count != node.imports().len() {
            return Err(TreeError::MalformedPayload {
                kind: "tree-dir",
                reason: format!(
                    "entry count {count} disagrees with {} imports",
                    node.imports().len()
                ),
            });
        }
        let mut entries = Vec::with_capacity(count);
        for import in node.imports() {
            let name_bytes = r.read_prefixed()?;
            let name = std::str::from_utf8(&name_bytes)
                .map_err(|_| TreeError::MalformedPayload {
                    kind: "tree-dir",
                    reason: "entry name is not UTF-8".into(),
                })?
                .to_string();
            let tag = r.read_bytes(1)?[0];
            let kind = match tag {
                ENTRY_TAG_FILE => DirEntryKind::File,
                ENTRY_TAG_DIR => DirEntryKind::Dir,
                other => {
                    return Err(TreeError::MalformedPayload {
                        kind: "tree-dir",
                        reason: format!("unknown entry tag {other}"),
                    })
                }
            };
            entries.push((name, kind, import.clone()));
        }
        Ok(Self { entries })
    }
}
