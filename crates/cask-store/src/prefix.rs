use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::error::{StoreError, StoreResult};
use crate::traits::{validate_key, ObjectMeta, ObjectStore};

/// Decorator that partitions a shared backend by key prefix.
///
/// Every key is rewritten to `<prefix>/<key>` on the way in; enumeration
/// strips the prefix on the way out. Inner keys that do not carry the
/// prefix belong to a different logical namespace multiplexed onto the
/// same backend and are simply not yielded.
pub struct PrefixedObjectStore {
    inner: Arc<dyn ObjectStore>,
    /// Normalized to always end with a single `/`.
    prefix: String,
}

impl PrefixedObjectStore {
    /// Wrap `inner`, scoping all keys under `prefix`.
    ///
    /// The prefix itself must be a valid key (no trailing slash needed;
    /// one is added internally).
    pub fn new(inner: Arc<dyn ObjectStore>, prefix: &str) -> StoreResult<Self> {
        let trimmed = prefix.trim_end_matches('/');
        validate_key(trimmed)?;
        Ok(Self {
            inner,
            prefix: format!("{trimmed}/"),
        })
    }

    /// The normalized prefix, including the trailing slash.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn inner_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

impl std::fmt::Debug for PrefixedObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixedObjectStore")
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[async_trait::async_trait]
impl ObjectStore for PrefixedObjectStore {
    async fn read(&self, key: &str) -> StoreResult<Bytes> {
        validate_key(key)?;
        self.inner.read(&self.inner_key(key)).await.map_err(|e| {
            // Report the caller's key, not the rewritten one.
            match e {
                StoreError::NotFound(_) => StoreError::NotFound(key.to_string()),
                other => other,
            }
        })
    }

    async fn open(
        &self,
        key: &str,
        offset: u64,
        len: Option<u64>,
    ) -> StoreResult<Box<dyn AsyncRead + Send + Unpin>> {
        validate_key(key)?;
        self.inner.open(&self.inner_key(key), offset, len).await
    }

    async fn write(&self, key: &str, data: Bytes) -> StoreResult<()> {
        validate_key(key)?;
        self.inner.write(&self.inner_key(key), data).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        self.inner.exists(&self.inner_key(key)).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        self.inner.delete(&self.inner_key(key)).await
    }

    async fn list(
        &self,
        start_after: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<ObjectMeta>> {
        // Prefixed keys are contiguous in ascending key order, so the scan
        // starts at the prefix itself (no key equals a bare prefix).
        let inner_after = match start_after {
            Some(after) => self.inner_key(after),
            None => self.prefix.clone(),
        };
        let page = self.inner.list(Some(&inner_after), limit).await?;
        Ok(page
            .into_iter()
            .filter_map(|meta| {
                meta.key.strip_prefix(&self.prefix).map(|stripped| ObjectMeta {
                    key: stripped.to_string(),
                    size: meta.size,
                    modified: meta.modified,
                })
            })
            .collect())
    }

    fn try_read_redirect(&self, key: &str) -> Option<String> {
        self.inner.try_read_redirect(&self.inner_key(key))
    }

    fn try_write_redirect(&self, key: &str) -> Option<String> {
        self.inner.try_write_redirect(&self.inner_key(key))
    }
}
