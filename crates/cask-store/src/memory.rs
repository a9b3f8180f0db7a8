use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tokio::io::AsyncRead;

use cask_types::{Clock, SystemClock, Timestamp};

use crate::error::{StoreError, StoreResult};
use crate::traits::{validate_key, ObjectMeta, ObjectStore};

/// One stored entry: bytes plus the time of the last write.
#[derive(Clone)]
struct Entry {
    data: Bytes,
    modified: Timestamp,
}

/// In-memory, `BTreeMap`-based object store.
///
/// Intended for tests and embedding. The map is ordered so enumeration is
/// naturally keyset-paginated. The clock is injectable so grace-period
/// behavior can be driven by a [`cask_types::ManualClock`] in tests.
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryObjectStore {
    /// Create a new empty store stamping writes with the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a new empty store with an explicit clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|e| e.data.len() as u64)
            .sum()
    }

    /// Sorted list of all keys. For tests and debugging.
    pub fn all_keys(&self) -> Vec<String> {
        self.objects
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .finish()
    }
}

#[async_trait::async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn read(&self, key: &str) -> StoreResult<Bytes> {
        validate_key(key)?;
        let map = self.objects.read().expect("lock poisoned");
        map.get(key)
            .map(|e| e.data.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn open(
        &self,
        key: &str,
        offset: u64,
        len: Option<u64>,
    ) -> StoreResult<Box<dyn AsyncRead + Send + Unpin>> {
        let data = self.read(key).await?;
        let size = data.len() as u64;
        let len = len.unwrap_or(size.saturating_sub(offset));
        let end = offset.checked_add(len).filter(|e| *e <= size).ok_or(
            StoreError::RangeOutOfBounds {
                key: key.to_string(),
                offset,
                len,
                size,
            },
        )?;
        let slice = data.slice(offset as usize..end as usize);
        Ok(Box::new(std::io::Cursor::new(slice.to_vec())))
    }

    async fn write(&self, key: &str, data: Bytes) -> StoreResult<()> {
        validate_key(key)?;
        let modified = self.clock.now();
        let mut map = self.objects.write().expect("lock poisoned");
        map.insert(key.to_string(), Entry { data, modified });
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(key))
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        let mut map = self.objects.write().expect("lock poisoned");
        Ok(map.remove(key).is_some())
    }

    async fn list(
        &self,
        start_after: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<ObjectMeta>> {
        let map = self.objects.read().expect("lock poisoned");
        let iter: Box<dyn Iterator<Item = (&String, &Entry)>> = match start_after {
            Some(after) => Box::new(
                map.range::<str, _>((
                    std::ops::Bound::Excluded(after),
                    std::ops::Bound::Unbounded,
                )),
            ),
            None => Box::new(map.iter()),
        };
        Ok(iter
            .take(limit)
            .map(|(key, entry)| ObjectMeta {
                key: key.clone(),
                size: entry.data.len() as u64,
                modified: entry.modified,
            })
            .collect())
    }
}
