use bytes::Bytes;
use tokio::io::AsyncRead;

use cask_types::Timestamp;

use crate::error::{StoreError, StoreResult};

/// Metadata for one stored object, as produced by enumeration.
///
/// `modified` is the last time the key was written (or re-written); the
/// garbage collector compares it against the namespace grace period before
/// deleting an unreachable object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    /// The object's key within the namespace.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last write time.
    pub modified: Timestamp,
}

/// Byte-level storage backend for one namespace.
///
/// All implementations must satisfy these invariants:
/// - A completed `write` is atomic: concurrent readers observe either the
///   full object or `NotFound`, never partial content.
/// - Writing the same key twice is tolerated. Keys are derived from content,
///   so two writers racing on one key carry identical bytes; the second
///   write may overwrite or be skipped, both are correct.
/// - Concurrent reads are always safe.
/// - `list` returns keys in ascending order and is restartable: pass the
///   last returned key as `start_after` to continue, or re-invoke from
///   `None` to start over.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read a whole object into owned memory.
    ///
    /// Fails with [`StoreError::NotFound`] if the key does not exist.
    async fn read(&self, key: &str) -> StoreResult<Bytes>;

    /// Read `len` bytes starting at `offset`.
    ///
    /// Fails with [`StoreError::RangeOutOfBounds`] if the range does not
    /// lie within the object.
    async fn read_range(&self, key: &str, offset: u64, len: u64) -> StoreResult<Bytes> {
        let data = self.read(key).await?;
        let size = data.len() as u64;
        let end = offset.checked_add(len).filter(|e| *e <= size).ok_or(
            StoreError::RangeOutOfBounds {
                key: key.to_string(),
                offset,
                len,
                size,
            },
        )?;
        Ok(data.slice(offset as usize..end as usize))
    }

    /// Open a byte stream over `[offset, offset + len)` of the object, or
    /// from `offset` to the end when `len` is `None`.
    async fn open(
        &self,
        key: &str,
        offset: u64,
        len: Option<u64>,
    ) -> StoreResult<Box<dyn AsyncRead + Send + Unpin>>;

    /// Write an object. Atomic from the reader's perspective.
    async fn write(&self, key: &str, data: Bytes) -> StoreResult<()>;

    /// Check whether a key exists.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Delete a key. Returns `true` if it existed.
    ///
    /// This is intended for the garbage collector and administrative
    /// cleanup only; deleting a referenced blob corrupts the graph.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Enumerate up to `limit` objects with keys strictly greater than
    /// `start_after`, in ascending key order.
    async fn list(
        &self,
        start_after: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<ObjectMeta>>;

    /// URL for direct client reads, for backends that support redirection.
    fn try_read_redirect(&self, _key: &str) -> Option<String> {
        None
    }

    /// URL for direct client writes, for backends that support redirection.
    fn try_write_redirect(&self, _key: &str) -> Option<String> {
        None
    }
}

/// Page size used by the prefix-collection helper.
const LIST_PAGE: usize = 256;

/// Collect every object whose key starts with `prefix`.
///
/// Keys ascend, and keys sharing a prefix are contiguous in that order, so
/// the scan seeds the cursor at the prefix itself and stops at the first
/// non-matching key.
pub async fn collect_prefix(
    store: &dyn ObjectStore,
    prefix: &str,
) -> StoreResult<Vec<ObjectMeta>> {
    let mut out = Vec::new();
    let mut cursor = prefix.to_string();
    loop {
        let page = store.list(Some(&cursor), LIST_PAGE).await?;
        let Some(last) = page.last() else {
            break;
        };
        cursor = last.key.clone();
        let page_len = page.len();
        let mut done = false;
        for meta in page {
            if meta.key.starts_with(prefix) {
                out.push(meta);
            } else {
                done = true;
                break;
            }
        }
        if done || page_len < LIST_PAGE {
            break;
        }
    }
    Ok(out)
}

/// Validate an object key: non-empty slash-separated path, no traversal,
/// no empty components, no leading/trailing slash.
pub fn validate_key(key: &str) -> StoreResult<()> {
    let fail = |reason: &str| {
        Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        })
    };
    if key.is_empty() {
        return fail("key must not be empty");
    }
    if key.starts_with('/') || key.ends_with('/') {
        return fail("key must not start or end with '/'");
    }
    if key.contains('\\') || key.contains('\0') {
        return fail("key must not contain backslash or NUL");
    }
    for component in key.split('/') {
        if component.is_empty() {
            return fail("key components must not be empty");
        }
        if component == "." || component == ".." {
            return fail("key components must not be '.' or '..'");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_keys() {
        assert!(validate_key("blobs/ab/cdef").is_ok());
        assert!(validate_key("refs/nightly").is_ok());
        assert!(validate_key("a").is_ok());
    }

    #[test]
    fn invalid_keys() {
        assert!(validate_key("").is_err());
        assert!(validate_key("/abs").is_err());
        assert!(validate_key("trailing/").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("a/../b").is_err());
        assert!(validate_key("a/./b").is_err());
        assert!(validate_key("a\\b").is_err());
    }
}
