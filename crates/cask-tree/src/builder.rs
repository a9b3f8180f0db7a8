use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use bytes::Bytes;
use tracing::{debug, warn};

use cask_codec::{BlobHandle, BlobWriter};
use cask_store::ObjectStore;
use cask_types::{CancelToken, ContentHasher};

use crate::chunker::{Chunker, ChunkerConfig};
use crate::error::{TreeError, TreeResult};
use crate::schema::{chunk_kind, dir_kind, file_kind, DirBlob, DirEntryKind, FileBlob};

/// Options controlling how files are turned into blobs.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Files at or below this size are stored inline in a single blob.
    pub inline_threshold: usize,
    /// Chunking parameters for files above the threshold.
    pub chunker: ChunkerConfig,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            inline_threshold: 64 * 1024, // 64 KiB
            chunker: ChunkerConfig::default(),
        }
    }
}

/// One entry of an in-memory tree.
enum NodeSource {
    File(Bytes),
    Dir(DirBuilder),
}

/// An in-memory directory tree, assembled entry by entry and collapsed
/// into the store bottom-up.
///
/// Entries are kept in a `BTreeMap`, so encoding order is sorted name
/// order: two builders with identical contents collapse to the same root
/// locator, and collapsing the same builder twice is idempotent.
#[derive(Default)]
pub struct DirBuilder {
    entries: BTreeMap<String, NodeSource>,
}

impl DirBuilder {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of direct entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the directory has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add (or replace) a file entry.
    pub fn add_file(&mut self, name: &str, content: impl Into<Bytes>) -> TreeResult<()> {
        validate_entry_name(name)?;
        self.entries
            .insert(name.to_string(), NodeSource::File(content.into()));
        Ok(())
    }

    /// Add (or replace) a subdirectory entry.
    pub fn add_dir(&mut self, name: &str, dir: DirBuilder) -> TreeResult<()> {
        validate_entry_name(name)?;
        self.entries.insert(name.to_string(), NodeSource::Dir(dir));
        Ok(())
    }

    /// Insert a file at a relative path, creating intermediate directories.
    fn insert_file_at(&mut self, components: &[String], content: Bytes) -> TreeResult<()> {
        let Some((first, rest)) = components.split_first() else {
            return Err(TreeError::InvalidEntryName(String::new()));
        };
        if rest.is_empty() {
            return self.add_file(first, content);
        }
        self.ensure_dir(first)?.insert_file_at(rest, content)
    }

    /// Insert an empty directory at a relative path.
    fn insert_dir_at(&mut self, components: &[String]) -> TreeResult<()> {
        let Some((first, rest)) = components.split_first() else {
            return Ok(());
        };
        let sub = self.ensure_dir(first)?;
        sub.insert_dir_at(rest)
    }

    fn ensure_dir(&mut self, name: &str) -> TreeResult<&mut DirBuilder> {
        validate_entry_name(name)?;
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| NodeSource::Dir(DirBuilder::new()));
        match entry {
            NodeSource::Dir(dir) => Ok(dir),
            NodeSource::File(_) => Err(TreeError::InvalidEntryName(format!(
                "{name}: path component is a file"
            ))),
        }
    }

    /// Flush the whole tree into the store, bottom-up, and return the root
    /// handle.
    ///
    /// Every node is durably stored before its parent record is completed,
    /// so the store never holds a parent whose import is missing. The same
    /// tree collapses to the same root locator every time.
    pub async fn collapse(
        &self,
        store: &dyn ObjectStore,
        options: &BuildOptions,
        cancel: &CancelToken,
    ) -> TreeResult<BlobHandle> {
        let chunker = Chunker::new(options.chunker.clone())?;
        let handle = collapse_dir(self, store, &chunker, options, cancel).await?;
        debug!(root = %handle.locator(), "tree collapsed");
        Ok(handle)
    }
}

impl std::fmt::Debug for DirBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirBuilder")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Validate one tree entry name as a safe path component.
pub(crate) fn validate_entry_name(name: &str) -> TreeResult<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(TreeError::InvalidEntryName(name.to_string()));
    }
    Ok(())
}

fn collapse_dir<'a>(
    dir: &'a DirBuilder,
    store: &'a dyn ObjectStore,
    chunker: &'a Chunker,
    options: &'a BuildOptions,
    cancel: &'a CancelToken,
) -> Pin<Box<dyn Future<Output = TreeResult<BlobHandle>> + Send + 'a>> {
    Box::pin(async move {
        let mut writer = BlobWriter::new();
        let mut entries = Vec::with_capacity(dir.entries.len());
        for (name, source) in &dir.entries {
            if cancel.is_cancelled() {
                return Err(TreeError::Cancelled);
            }
            let (child, kind) = match source {
                NodeSource::File(content) => (
                    collapse_file(content, store, chunker, options, cancel).await?,
                    DirEntryKind::File,
                ),
                NodeSource::Dir(sub) => (
                    collapse_dir(sub, store, chunker, options, cancel).await?,
                    DirEntryKind::Dir,
                ),
            };
            writer.add_import(&child);
            entries.push((name.clone(), kind));
        }
        DirBlob::encode_into(&mut writer, &entries);
        let handle = writer.complete(dir_kind())?;
        handle.flush(store).await?;
        Ok(handle)
    })
}

async fn collapse_file(
    content: &Bytes,
    store: &dyn ObjectStore,
    chunker: &Chunker,
    options: &BuildOptions,
    cancel: &CancelToken,
) -> TreeResult<BlobHandle> {
    let content_id = ContentHasher::FILE.hash(content);
    let mut writer = BlobWriter::new();

    if content.len() <= options.inline_threshold {
        FileBlob::encode_into(
            &mut writer,
            content.len() as u64,
            &content_id,
            Some(content.as_ref()),
            0,
        );
    } else {
        let chunks = chunker.chunk(content);
        for chunk in &chunks {
            if cancel.is_cancelled() {
                return Err(TreeError::Cancelled);
            }
            let mut chunk_writer = BlobWriter::new();
            chunk_writer.put(&chunk.data);
            let chunk_handle = chunk_writer.complete(chunk_kind())?;
            chunk_handle.flush(store).await?;
            writer.add_import(&chunk_handle);
        }
        FileBlob::encode_into(
            &mut writer,
            content.len() as u64,
            &content_id,
            None,
            chunks.len(),
        );
    }

    let handle = writer.complete(file_kind())?;
    handle.flush(store).await?;
    Ok(handle)
}

/// Build a blob tree from a directory on disk.
///
/// Walks `path` recursively (symlinks are skipped), chunks large files,
/// and collapses the result bottom-up into the store.
pub async fn build_from_directory(
    store: &dyn ObjectStore,
    path: &Path,
    options: &BuildOptions,
    cancel: &CancelToken,
) -> TreeResult<BlobHandle> {
    let builder = load_directory(path, cancel).await?;
    builder.collapse(store, options, cancel).await
}

async fn load_directory(path: &Path, cancel: &CancelToken) -> TreeResult<DirBuilder> {
    // Gather the structure with a blocking walk, then read file contents
    // through the async runtime.
    let root = path.to_path_buf();
    let listing = tokio::task::spawn_blocking(move || -> TreeResult<Vec<(Vec<String>, bool)>> {
        let mut listing = Vec::new();
        for entry in walkdir::WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                TreeError::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::other("walk failed without io cause")
                }))
            })?;
            if entry.path() == root {
                continue;
            }
            let file_type = entry.file_type();
            if file_type.is_symlink() {
                warn!(path = %entry.path().display(), "skipping symlink");
                continue;
            }
            let components: Vec<String> = entry
                .path()
                .strip_prefix(&root)
                .expect("walk yields paths under root")
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            listing.push((components, file_type.is_dir()));
        }
        Ok(listing)
    })
    .await
    .map_err(|e| TreeError::Io(std::io::Error::other(e)))??;

    let mut builder = DirBuilder::new();
    for (components, is_dir) in listing {
        if cancel.is_cancelled() {
            return Err(TreeError::Cancelled);
        }
        if is_dir {
            builder.insert_dir_at(&components)?;
        } else {
            let file_path: std::path::PathBuf =
                path.join(components.join(std::path::MAIN_SEPARATOR_STR));
            let content = tokio::fs::read(&file_path).await?;
            builder.insert_file_at(&components, Bytes::from(content))?;
        }
    }
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileContent;
    use cask_store::InMemoryObjectStore;

    fn tiny_options() -> BuildOptions {
        BuildOptions {
            inline_threshold: 32,
            chunker: ChunkerConfig {
                min_size: 64,
                max_size: 512,
                mask_bits: 7,
            },
        }
    }

    fn noise(len: usize, seed: u8) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        let mut state = 0x243f6a8885a308d3u64 ^ u64::from(seed);
        while out.len() < len {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            out.extend_from_slice(&state.to_le_bytes());
        }
        out.truncate(len);
        out
    }

    #[tokio::test]
    async fn collapse_small_tree() {
        let store = InMemoryObjectStore::new();
        let mut root = DirBuilder::new();
        root.add_file("a.txt", &b"alpha"[..]).unwrap();
        let mut sub = DirBuilder::new();
        sub.add_file("b.txt", &b"beta"[..]).unwrap();
        root.add_dir("sub", sub).unwrap();

        let handle = root
            .collapse(&store, &tiny_options(), &CancelToken::new())
            .await
            .unwrap();
        // Root dir + sub dir + two file blobs.
        assert_eq!(store.len(), 4);

        let node = handle.expand(&store).await.unwrap();
        let dir = DirBlob::decode(&node).unwrap();
        assert_eq!(dir.entries[0].0, "a.txt");
        assert_eq!(dir.entries[1].0, "sub");
    }

    #[tokio::test]
    async fn collapse_is_idempotent() {
        let store = InMemoryObjectStore::new();
        let mut root = DirBuilder::new();
        root.add_file("f", noise(5000, 1)).unwrap();

        let first = root
            .collapse(&store, &tiny_options(), &CancelToken::new())
            .await
            .unwrap();
        let count_after_first = store.len();
        let second = root
            .collapse(&store, &tiny_options(), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(first.locator(), second.locator());
        assert_eq!(store.len(), count_after_first);
    }

    #[tokio::test]
    async fn identical_directories_share_one_blob() {
        let store = InMemoryObjectStore::new();
        let mut root = DirBuilder::new();
        for name in ["left", "right"] {
            let mut sub = DirBuilder::new();
            sub.add_file("same.txt", &b"identical"[..]).unwrap();
            root.add_dir(name, sub).unwrap();
        }

        let handle = root
            .collapse(&store, &tiny_options(), &CancelToken::new())
            .await
            .unwrap();
        let node = handle.expand(&store).await.unwrap();
        let dir = DirBlob::decode(&node).unwrap();
        assert_eq!(dir.entries[0].2, dir.entries[1].2);
        // Root + one shared subdir + one shared file.
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn large_file_is_chunked() {
        let store = InMemoryObjectStore::new();
        let mut root = DirBuilder::new();
        root.add_file("big.bin", noise(8_000, 2)).unwrap();

        let handle = root
            .collapse(&store, &tiny_options(), &CancelToken::new())
            .await
            .unwrap();
        let node = handle.expand(&store).await.unwrap();
        let dir = DirBlob::decode(&node).unwrap();

        let file_node = cask_codec::BlobHandle::lazy(dir.entries[0].2.clone())
            .expand(&store)
            .await
            .unwrap();
        let file = FileBlob::decode(&file_node).unwrap();
        match file.content {
            FileContent::Chunked(chunks) => assert!(chunks.len() > 1),
            FileContent::Inline(_) => panic!("expected chunked content"),
        }
        assert_eq!(file.size, 8_000);
    }

    #[tokio::test]
    async fn small_file_is_inline() {
        let store = InMemoryObjectStore::new();
        let mut root = DirBuilder::new();
        root.add_file("tiny", &b"tiny"[..]).unwrap();

        let handle = root
            .collapse(&store, &tiny_options(), &CancelToken::new())
            .await
            .unwrap();
        let node = handle.expand(&store).await.unwrap();
        let dir = DirBlob::decode(&node).unwrap();
        let file_node = cask_codec::BlobHandle::lazy(dir.entries[0].2.clone())
            .expand(&store)
            .await
            .unwrap();
        let file = FileBlob::decode(&file_node).unwrap();
        assert_eq!(file.content, FileContent::Inline(Bytes::from_static(b"tiny")));
    }

    #[tokio::test]
    async fn deduplicated_file_content_stored_once() {
        let store = InMemoryObjectStore::new();
        let mut root = DirBuilder::new();
        root.add_file("copy1", noise(5000, 3)).unwrap();
        root.add_file("copy2", noise(5000, 3)).unwrap();

        root.collapse(&store, &tiny_options(), &CancelToken::new())
            .await
            .unwrap();
        let single_count = store.len();

        let store2 = InMemoryObjectStore::new();
        let mut one = DirBuilder::new();
        one.add_file("copy1", noise(5000, 3)).unwrap();
        one.collapse(&store2, &tiny_options(), &CancelToken::new())
            .await
            .unwrap();
        // The second copy added nothing but the root dir difference.
        assert_eq!(single_count, store2.len());
    }

    #[tokio::test]
    async fn cancellation_aborts_collapse() {
        let store = InMemoryObjectStore::new();
        let mut root = DirBuilder::new();
        root.add_file("f", noise(1000, 4)).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = root
            .collapse(&store, &tiny_options(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::Cancelled));
    }

    #[tokio::test]
    async fn entry_names_validated() {
        let mut root = DirBuilder::new();
        assert!(root.add_file("", &b"x"[..]).is_err());
        assert!(root.add_file("a/b", &b"x"[..]).is_err());
        assert!(root.add_file("..", &b"x"[..]).is_err());
        assert!(root.add_dir(".", DirBuilder::new()).is_err());
    }

    #[tokio::test]
    async fn build_from_directory_walks_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("top.txt"), b"top").unwrap();
        std::fs::write(dir.path().join("sub").join("nested.txt"), b"nested").unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();

        let store = InMemoryObjectStore::new();
        let handle = build_from_directory(
            &store,
            dir.path(),
            &tiny_options(),
            &CancelToken::new(),
        )
        .await
        .unwrap();

        let node = handle.expand(&store).await.unwrap();
        let root = DirBlob::decode(&node).unwrap();
        let names: Vec<_> = root.entries.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, vec!["empty", "sub", "top.txt"]);
        assert_eq!(root.entries[0].1, DirEntryKind::Dir);
        assert_eq!(root.entries[2].1, DirEntryKind::File);
    }
}
