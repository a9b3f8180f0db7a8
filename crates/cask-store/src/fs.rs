use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use cask_types::Timestamp;

use crate::error::{StoreError, StoreResult};
use crate::traits::{validate_key, ObjectMeta, ObjectStore};

/// Prefix for in-flight temporary files. Enumeration skips them; crash
/// leftovers are cleaned up on open.
const TMP_PREFIX: &str = ".cask-tmp-";

/// Counter distinguishing temp files within one process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Filesystem-backed object store.
///
/// Objects live at `<root>/<key>` with key slashes as directories. A write
/// goes to a hidden temporary file in the final directory, is fsynced, and
/// is renamed into place; the rename is what makes the object visible, so a
/// reader never observes partial content. Two writers racing on one key
/// both rename complete files carrying identical bytes (keys derive from
/// content), so whichever rename lands last is indistinguishable from the
/// first.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Open a store rooted at `root`, creating the directory if needed and
    /// removing any temporary files left behind by a crash.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let store = Self { root };
        store.sweep_stale_tmp();
        Ok(store)
    }

    /// The root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn tmp_path(&self, final_path: &Path) -> PathBuf {
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}{}-{}", TMP_PREFIX, std::process::id(), seq);
        final_path
            .parent()
            .unwrap_or(&self.root)
            .join(name)
    }

    /// Remove leftover temp files from previous runs. Failures are logged
    /// and ignored; a stray temp file is invisible to enumeration anyway.
    fn sweep_stale_tmp(&self) {
        let walker = walkdir::WalkDir::new(&self.root).into_iter();
        for entry in walker.flatten() {
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_file() && name.starts_with(TMP_PREFIX) {
                if let Err(e) = std::fs::remove_file(entry.path()) {
                    warn!(path = %entry.path().display(), error = %e, "failed to remove stale temp file");
                }
            }
        }
    }
}

impl std::fmt::Debug for FsObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsObjectStore")
            .field("root", &self.root)
            .finish()
    }
}

#[async_trait::async_trait]
impl ObjectStore for FsObjectStore {
    async fn read(&self, key: &str) -> StoreResult<Bytes> {
        validate_key(key)?;
        match fs::read(self.object_path(key)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open(
        &self,
        key: &str,
        offset: u64,
        len: Option<u64>,
    ) -> StoreResult<Box<dyn AsyncRead + Send + Unpin>> {
        validate_key(key)?;
        let mut file = match fs::File::open(self.object_path(key)).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();
        let len = len.unwrap_or(size.saturating_sub(offset));
        if offset.checked_add(len).map_or(true, |end| end > size) {
            return Err(StoreError::RangeOutOfBounds {
                key: key.to_string(),
                offset,
                len,
                size,
            });
        }
        file.seek(SeekFrom::Start(offset)).await?;
        Ok(Box::new(file.take(len)))
    }

    async fn write(&self, key: &str, data: Bytes) -> StoreResult<()> {
        validate_key(key)?;
        let final_path = self.object_path(key);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = self.tmp_path(&final_path);
        let result = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, &final_path).await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Err(e) = result {
            // Never leave a partial temp file behind.
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(key, bytes = data.len(), "object written");
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        match fs::metadata(self.object_path(key)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        match fs::remove_file(self.object_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(
        &self,
        start_after: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<ObjectMeta>> {
        let root = self.root.clone();
        let start_after = start_after.map(str::to_string);
        let metas = tokio::task::spawn_blocking(move || -> StoreResult<Vec<ObjectMeta>> {
            let mut metas = Vec::new();
            for entry in walkdir::WalkDir::new(&root).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    StoreError::Io(e.into_io_error().unwrap_or_else(|| {
                        std::io::Error::other("walk failed without io cause")
                    }))
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(TMP_PREFIX)
                {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(&root)
                    .expect("walk yields paths under root");
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if let Some(ref after) = start_after {
                    if key.as_str() <= after.as_str() {
                        continue;
                    }
                }
                let meta = entry.metadata().map_err(|e| {
                    StoreError::Io(e.into_io_error().unwrap_or_else(|| {
                        std::io::Error::other("metadata failed without io cause")
                    }))
                })?;
                let modified = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| Timestamp::from_millis(d.as_millis() as u64))
                    .unwrap_or_default();
                metas.push(ObjectMeta {
                    key,
                    size: meta.len(),
                    modified,
                });
            }
            // Directory order is not byte order of the joined keys; sort to
            // uphold the pagination contract.
            metas.sort_by(|a, b| a.key.cmp(&b.key));
            metas.truncate(limit);
            Ok(metas)
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;
        Ok(metas)
    }
}
