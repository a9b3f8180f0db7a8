use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tracing::{debug, warn};

use cask_codec::{BlobHandle, BlobLocator};
use cask_store::ObjectStore;
use cask_types::{CancelToken, ContentHasher};

use crate::builder::validate_entry_name;
use crate::error::{TreeError, TreeResult};
use crate::schema::{chunk_kind, DirBlob, DirEntryKind, FileBlob, FileContent};

/// One file or subtree that could not be materialized.
#[derive(Clone, Debug)]
pub struct MaterializeFailure {
    /// Output path that failed.
    pub path: PathBuf,
    /// Human-readable cause.
    pub error: String,
}

/// Outcome of [`expand_to_directory`].
///
/// Per-file failures are collected here rather than aborting the
/// expansion: one unreadable blob or unwritable path never corrupts
/// siblings that already landed on disk.
#[derive(Clone, Debug, Default)]
pub struct MaterializeReport {
    /// Files written successfully.
    pub files_written: usize,
    /// Directories created.
    pub dirs_created: usize,
    /// Entries that failed, with their paths.
    pub failures: Vec<MaterializeFailure>,
}

impl MaterializeReport {
    /// Returns `true` if every entry materialized.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Expand a blob tree onto disk at `out`.
///
/// The inverse of [`crate::build_from_directory`]: recreates the directory
/// structure and byte-identical file contents. A failure on the root
/// itself is an error; failures below the root are reported per-entry in
/// the returned [`MaterializeReport`].
pub async fn expand_to_directory(
    store: &dyn ObjectStore,
    handle: &BlobHandle,
    out: &Path,
    cancel: &CancelToken,
) -> TreeResult<MaterializeReport> {
    let node = handle.expand(store).await?;
    let dir = DirBlob::decode(&node)?;

    tokio::fs::create_dir_all(out)
        .await
        .map_err(|e| TreeError::Materialize {
            path: out.to_path_buf(),
            reason: e.to_string(),
        })?;

    let mut report = MaterializeReport {
        dirs_created: 1,
        ..Default::default()
    };
    expand_dir(store, &dir, out, cancel, &mut report).await?;
    debug!(
        files = report.files_written,
        dirs = report.dirs_created,
        failures = report.failures.len(),
        "tree materialized"
    );
    Ok(report)
}

fn expand_dir<'a>(
    store: &'a dyn ObjectStore,
    dir: &'a DirBlob,
    out: &'a Path,
    cancel: &'a CancelToken,
    report: &'a mut MaterializeReport,
) -> Pin<Box<dyn Future<Output = TreeResult<()>> + Send + 'a>> {
    Box::pin(async move {
        for (name, kind, locator) in &dir.entries {
            if cancel.is_cancelled() {
                return Err(TreeError::Cancelled);
            }
            // A hostile record could smuggle separators into entry names;
            // refuse to write outside the output root.
            if validate_entry_name(name).is_err() {
                report.failures.push(MaterializeFailure {
                    path: out.join("<invalid>"),
                    error: format!("invalid entry name {name:?}"),
                });
                continue;
            }
            let target = out.join(name);
            match kind {
                DirEntryKind::File => {
                    match materialize_file(store, locator, &target).await {
                        Ok(()) => report.files_written += 1,
                        Err(TreeError::Cancelled) => return Err(TreeError::Cancelled),
                        Err(e) => {
                            warn!(path = %target.display(), error = %e, "failed to materialize file");
                            report.failures.push(MaterializeFailure {
                                path: target,
                                error: e.to_string(),
                            });
                        }
                    }
                }
                DirEntryKind::Dir => {
                    match expand_subdir(store, locator, &target, cancel, report).await {
                        Ok(()) => {}
                        Err(TreeError::Cancelled) => return Err(TreeError::Cancelled),
                        Err(e) => {
                            warn!(path = %target.display(), error = %e, "failed to materialize subtree");
                            report.failures.push(MaterializeFailure {
                                path: target,
                                error: e.to_string(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    })
}

async fn expand_subdir(
    store: &dyn ObjectStore,
    locator: &BlobLocator,
    target: &Path,
    cancel: &CancelToken,
    report: &mut MaterializeReport,
) -> TreeResult<()> {
    let node = BlobHandle::lazy(locator.clone()).expand(store).await?;
    let sub = DirBlob::decode(&node)?;
    tokio::fs::create_dir_all(target).await?;
    report.dirs_created += 1;
    expand_dir(store, &sub, target, cancel, report).await
}

async fn materialize_file(
    store: &dyn ObjectStore,
    locator: &BlobLocator,
    target: &Path,
) -> TreeResult<()> {
    let node = BlobHandle::lazy(locator.clone()).expand(store).await?;
    let file = FileBlob::decode(&node)?;

    let content = match &file.content {
        FileContent::Inline(bytes) => bytes.to_vec(),
        FileContent::Chunked(chunks) => {
            let mut assembled = Vec::with_capacity(file.size as usize);
            for chunk_locator in chunks {
                let chunk_node = BlobHandle::lazy(chunk_locator.clone())
                    .expand(store)
                    .await?;
                chunk_node.expect_kind(&chunk_kind())?;
                assembled.extend_from_slice(chunk_node.payload());
            }
            assembled
        }
    };

    if content.len() as u64 != file.size {
        return Err(TreeError::MalformedPayload {
            kind: "tree-file",
            reason: format!(
                "assembled {} bytes, file blob claims {}",
                content.len(),
                file.size
            ),
        });
    }
    let actual_id = ContentHasher::FILE.hash(&content);
    if actual_id != file.content_id {
        return Err(TreeError::MalformedPayload {
            kind: "tree-file",
            reason: "assembled content does not match its content id".into(),
        });
    }

    tokio::fs::write(target, &content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{build_from_directory, BuildOptions, DirBuilder};
    use crate::chunker::ChunkerConfig;
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
        let mut state = 0x13198a2e03707344u64 ^ u64::from(seed);
        while out.len() < len {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            out.extend_from_slice(&state.to_le_bytes());
        }
        out.truncate(len);
        out
    }

    fn read_dir_sorted(path: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(path)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn tree_roundtrip_is_byte_identical() {
        let input = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(input.path().join("docs/guides")).unwrap();
        std::fs::write(input.path().join("small.txt"), b"small contents").unwrap();
        std::fs::write(input.path().join("big.bin"), noise(10_000, 1)).unwrap();
        std::fs::write(input.path().join("docs/readme.md"), b"# readme").unwrap();
        std::fs::write(input.path().join("docs/guides/a.md"), b"guide a").unwrap();

        let store = InMemoryObjectStore::new();
        let cancel = CancelToken::new();
        let handle = build_from_directory(&store, input.path(), &tiny_options(), &cancel)
            .await
            .unwrap();

        let output = tempfile::tempdir().unwrap();
        let report = expand_to_directory(&store, &handle, output.path(), &cancel)
            .await
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.files_written, 4);

        for rel in ["small.txt", "big.bin", "docs/readme.md", "docs/guides/a.md"] {
            let original = std::fs::read(input.path().join(rel)).unwrap();
            let expanded = std::fs::read(output.path().join(rel)).unwrap();
            assert_eq!(original, expanded, "mismatch at {rel}");
        }
        assert_eq!(
            read_dir_sorted(input.path()),
            read_dir_sorted(output.path())
        );
    }

    #[tokio::test]
    async fn empty_directories_are_recreated() {
        let store = InMemoryObjectStore::new();
        let cancel = CancelToken::new();
        let mut root = DirBuilder::new();
        root.add_dir("hollow", DirBuilder::new()).unwrap();
        let handle = root.collapse(&store, &tiny_options(), &cancel).await.unwrap();

        let output = tempfile::tempdir().unwrap();
        let report = expand_to_directory(&store, &handle, output.path(), &cancel)
            .await
            .unwrap();
        assert!(output.path().join("hollow").is_dir());
        assert_eq!(report.dirs_created, 2);
    }

    #[tokio::test]
    async fn missing_chunk_fails_one_file_not_the_rest() {
        let store = InMemoryObjectStore::new();
        let cancel = CancelToken::new();
        let mut root = DirBuilder::new();
        root.add_file("healthy.txt", &b"fine"[..]).unwrap();
        root.add_file("wounded.bin", noise(5_000, 2)).unwrap();
        let handle = root.collapse(&store, &tiny_options(), &cancel).await.unwrap();

        // Remove one chunk of the big file from the store.
        let node = handle.expand(&store).await.unwrap();
        let dir = DirBlob::decode(&node).unwrap();
        let (_, _, wounded) = dir
            .entries
            .iter()
            .find(|(n, _, _)| n == "wounded.bin")
            .unwrap();
        let file_node = BlobHandle::lazy(wounded.clone()).expand(&store).await.unwrap();
        let file = FileBlob::decode(&file_node).unwrap();
        let FileContent::Chunked(chunks) = &file.content else {
            panic!("expected chunked content");
        };
        store.delete(&chunks[0].key).await.unwrap();

        let output = tempfile::tempdir().unwrap();
        let report = expand_to_directory(&store, &handle, output.path(), &cancel)
            .await
            .unwrap();

        assert_eq!(report.files_written, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0]
            .path
            .ends_with("wounded.bin"));
        assert_eq!(
            std::fs::read(output.path().join("healthy.txt")).unwrap(),
            b"fine"
        );
        assert!(!output.path().join("wounded.bin").exists());
    }

    #[tokio::test]
    async fn expanding_a_file_blob_as_root_fails() {
        let store = InMemoryObjectStore::new();
        let cancel = CancelToken::new();

        let mut w = cask_codec::BlobWriter::new();
        w.put(b"not a directory");
        let handle = w.complete(crate::schema::file_kind()).unwrap();
        handle.flush(&store).await.unwrap();

        let output = tempfile::tempdir().unwrap();
        let err = expand_to_directory(&store, &handle, output.path(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::Codec(_)));
    }

    #[tokio::test]
    async fn cancellation_stops_expansion() {
        let store = InMemoryObjectStore::new();
        let cancel = CancelToken::new();
        let mut root = DirBuilder::new();
        root.add_file("f", &b"content"[..]).unwrap();
        let handle = root.collapse(&store, &tiny_options(), &cancel).await.unwrap();

        let cancelled = CancelToken::new();
        cancelled.cancel();
        let output = tempfile::tempdir().unwrap();
        let err = expand_to_directory(&store, &handle, output.path(), &cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::Cancelled));
    }
}
