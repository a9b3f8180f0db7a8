use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use cask_codec::{AliasDirectory, AliasMatch, BlobHandle, BlobLocator, BlobNode, BlobWriter};
use cask_gc::{Collector, GcConfig, GcReport};
use cask_refs::{RefDirectory, RefOptions, RefRecord};
use cask_store::{
    open_backend, BackendSpec, FsObjectStore, InMemoryObjectStore, ObjectStore,
    PrefixedObjectStore,
};
use cask_tree::{build_from_directory, expand_to_directory, BuildOptions, MaterializeReport};
use cask_types::{CancelToken, Clock, SystemClock};

use crate::config::NamespaceSpec;
use crate::error::{EngineError, EngineResult};

/// One wired namespace: its store and the directories layered over it.
pub struct Namespace {
    id: String,
    store: Arc<dyn ObjectStore>,
    refs: RefDirectory,
    aliases: AliasDirectory,
    collector: Arc<Collector>,
}

impl Namespace {
    /// The namespace id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The namespace's object store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// The namespace's ref directory.
    pub fn refs(&self) -> &RefDirectory {
        &self.refs
    }

    /// The namespace's alias directory.
    pub fn aliases(&self) -> &AliasDirectory {
        &self.aliases
    }

    /// The namespace's garbage collector.
    pub fn collector(&self) -> &Arc<Collector> {
        &self.collector
    }
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace").field("id", &self.id).finish()
    }
}

/// The engine: all configured namespaces plus the client surface the
/// surrounding service layer calls.
pub struct Engine {
    namespaces: HashMap<String, Arc<Namespace>>,
    gc_tasks: Mutex<HashMap<String, (CancelToken, tokio::task::JoinHandle<()>)>>,
}

impl Engine {
    /// Wire up an engine from namespace configuration, stamping time with
    /// the system clock.
    pub fn open(specs: Vec<NamespaceSpec>) -> EngineResult<Self> {
        Self::open_with_clock(specs, Arc::new(SystemClock))
    }

    /// Wire up an engine with an explicit clock (tests drive expiry and
    /// grace periods through a manual one).
    pub fn open_with_clock(
        specs: Vec<NamespaceSpec>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        // Namespaces that name the same filesystem root share one physical
        // backend, partitioned by per-namespace key prefixes.
        let mut root_users: HashMap<PathBuf, usize> = HashMap::new();
        for spec in &specs {
            if let BackendSpec::Filesystem { root } = &spec.backend {
                *root_users.entry(root.clone()).or_default() += 1;
            }
        }
        let mut shared_roots: HashMap<PathBuf, Arc<dyn ObjectStore>> = HashMap::new();

        let owner = format!("cask-{}", std::process::id());
        let mut namespaces = HashMap::new();
        for spec in specs {
            if namespaces.contains_key(&spec.id) {
                return Err(EngineError::DuplicateNamespace(spec.id));
            }

            let store: Arc<dyn ObjectStore> = match &spec.backend {
                // Memory stores stamp writes with the engine clock so ref
                // expiry and the GC grace period share one time source.
                BackendSpec::Memory => Arc::new(InMemoryObjectStore::with_clock(clock.clone())),
                BackendSpec::Filesystem { root } if root_users[root] > 1 => {
                    let physical = match shared_roots.get(root) {
                        Some(store) => store.clone(),
                        None => {
                            let store: Arc<dyn ObjectStore> =
                                Arc::new(FsObjectStore::open(root)?);
                            shared_roots.insert(root.clone(), store.clone());
                            store
                        }
                    };
                    Arc::new(PrefixedObjectStore::new(physical, &spec.id)?)
                }
                other => open_backend(other)?,
            };

            let grace = Duration::from_secs(u64::from(spec.gc_grace_hours) * 3600);
            let collector = Arc::new(Collector::new(
                store.clone(),
                clock.clone(),
                GcConfig::with_grace_period(grace, owner.clone()),
            ));
            info!(namespace = %spec.id, grace_hours = spec.gc_grace_hours, "namespace opened");
            namespaces.insert(
                spec.id.clone(),
                Arc::new(Namespace {
                    id: spec.id,
                    refs: RefDirectory::new(store.clone(), clock.clone()),
                    aliases: AliasDirectory::new(store.clone(), clock.clone()),
                    store,
                    collector,
                }),
            );
        }

        Ok(Self {
            namespaces,
            gc_tasks: Mutex::new(HashMap::new()),
        })
    }

    /// Look up a configured namespace.
    pub fn namespace(&self, id: &str) -> EngineResult<&Arc<Namespace>> {
        self.namespaces
            .get(id)
            .ok_or_else(|| EngineError::UnknownNamespace(id.to_string()))
    }

    /// Ids of all configured namespaces, sorted.
    pub fn namespace_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.namespaces.keys().cloned().collect();
        ids.sort();
        ids
    }

    // ---------------------------------------------------------------
    // Blob operations
    // ---------------------------------------------------------------

    /// Start a writer for a new blob in the namespace.
    pub fn create_writer(&self, ns: &str) -> EngineResult<BlobWriter> {
        self.namespace(ns)?;
        Ok(BlobWriter::new())
    }

    /// Force the physical write of a completed blob and publish its alias
    /// registrations.
    pub async fn flush(&self, ns: &str, handle: &BlobHandle) -> EngineResult<()> {
        let namespace = self.namespace(ns)?;
        handle.flush(namespace.store.as_ref()).await?;
        if let BlobHandle::Resolved(node) = handle {
            for alias in node.aliases() {
                namespace
                    .aliases
                    .publish(&alias.alias, alias.rank, node.locator())
                    .await?;
            }
        }
        debug!(namespace = ns, blob = %handle.locator(), "blob flushed");
        Ok(())
    }

    /// Fetch and decode a blob by locator.
    pub async fn read_blob(&self, ns: &str, locator: &BlobLocator) -> EngineResult<Arc<BlobNode>> {
        let namespace = self.namespace(ns)?;
        let node = BlobHandle::lazy(locator.clone())
            .expand(namespace.store.as_ref())
            .await?;
        Ok(node)
    }

    /// Resolve a handle against the namespace's store.
    pub async fn expand(&self, ns: &str, handle: &BlobHandle) -> EngineResult<Arc<BlobNode>> {
        let namespace = self.namespace(ns)?;
        Ok(handle.expand(namespace.store.as_ref()).await?)
    }

    /// All blobs registered under an alias, ordered by rank then
    /// registration order.
    pub async fn find_aliases(&self, ns: &str, alias: &str) -> EngineResult<Vec<AliasMatch>> {
        let namespace = self.namespace(ns)?;
        Ok(namespace.aliases.find(alias).await?)
    }

    // ---------------------------------------------------------------
    // Ref operations
    // ---------------------------------------------------------------

    /// Create or overwrite a named root pointer.
    pub async fn write_ref(
        &self,
        ns: &str,
        name: &str,
        target: &BlobHandle,
        options: RefOptions,
    ) -> EngineResult<()> {
        let namespace = self.namespace(ns)?;
        Ok(namespace.refs.write(name, target, options).await?)
    }

    /// Read a ref; absent or expired refs fail with a ref NotFound error.
    pub async fn read_ref(&self, ns: &str, name: &str) -> EngineResult<RefRecord> {
        let namespace = self.namespace(ns)?;
        Ok(namespace.refs.read(name).await?)
    }

    /// Read a ref; absent or expired refs yield `None`.
    pub async fn try_read_ref(&self, ns: &str, name: &str) -> EngineResult<Option<RefRecord>> {
        let namespace = self.namespace(ns)?;
        Ok(namespace.refs.try_read(name).await?)
    }

    /// Administratively delete a ref.
    pub async fn delete_ref(&self, ns: &str, name: &str) -> EngineResult<bool> {
        let namespace = self.namespace(ns)?;
        Ok(namespace.refs.delete(name).await?)
    }

    // ---------------------------------------------------------------
    // Tree operations
    // ---------------------------------------------------------------

    /// Build a blob tree from a directory on disk.
    pub async fn build_tree(
        &self,
        ns: &str,
        path: &Path,
        options: &BuildOptions,
        cancel: &CancelToken,
    ) -> EngineResult<BlobHandle> {
        let namespace = self.namespace(ns)?;
        Ok(build_from_directory(namespace.store.as_ref(), path, options, cancel).await?)
    }

    /// Expand a blob tree onto disk.
    pub async fn expand_tree(
        &self,
        ns: &str,
        handle: &BlobHandle,
        out: &Path,
        cancel: &CancelToken,
    ) -> EngineResult<MaterializeReport> {
        let namespace = self.namespace(ns)?;
        Ok(expand_to_directory(namespace.store.as_ref(), handle, out, cancel).await?)
    }

    // ---------------------------------------------------------------
    // Garbage collection
    // ---------------------------------------------------------------

    /// Run one GC cycle for the namespace, inline.
    pub async fn run_gc_cycle(&self, ns: &str, cancel: &CancelToken) -> EngineResult<GcReport> {
        let namespace = self.namespace(ns)?;
        Ok(namespace.collector.run_cycle(cancel).await?)
    }

    /// Start the namespace's periodic collector. Replaces any previously
    /// started schedule for the same namespace.
    pub fn start_gc(&self, ns: &str, interval: Duration) -> EngineResult<()> {
        let namespace = self.namespace(ns)?;
        let cancel = CancelToken::new();
        let handle = namespace.collector.clone().spawn(interval, cancel.clone());

        let mut tasks = self.gc_tasks.lock().expect("gc task lock poisoned");
        if let Some((old_cancel, _)) = tasks.insert(ns.to_string(), (cancel, handle)) {
            old_cancel.cancel();
        }
        info!(namespace = ns, ?interval, "gc schedule started");
        Ok(())
    }

    /// Stop the namespace's periodic collector, if running.
    pub fn stop_gc(&self, ns: &str) {
        let mut tasks = self.gc_tasks.lock().expect("gc task lock poisoned");
        if let Some((cancel, _)) = tasks.remove(ns) {
            cancel.cancel();
            info!(namespace = ns, "gc schedule stopped");
        }
    }

    /// Cancel every scheduled collector and wait for the tasks to finish.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, (CancelToken, tokio::task::JoinHandle<()>))> = {
            let mut tasks = self.gc_tasks.lock().expect("gc task lock poisoned");
            tasks.drain().collect()
        };
        for (ns, (cancel, handle)) in drained {
            cancel.cancel();
            if let Err(e) = handle.await {
                debug!(namespace = %ns, error = %e, "gc task ended abnormally");
            }
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("namespaces", &self.namespace_ids())
            .finish()
    }
}
