//! The cask engine: namespace wiring and the client surface.
//!
//! Consumes read-only namespace configuration, builds one object store per
//! namespace (multiplexing namespaces that share a filesystem root behind
//! key prefixes), and exposes the operations the surrounding service layer
//! calls: blob writers, blob reads, refs, alias lookup, and garbage
//! collection scheduling.
//!
//! ```no_run
//! use cask_engine::{Engine, NamespaceSpec};
//! use cask_refs::RefOptions;
//! use cask_store::BackendSpec;
//!
//! # async fn example() -> Result<(), cask_engine::EngineError> {
//! let engine = Engine::open(vec![NamespaceSpec {
//!     id: "builds".into(),
//!     backend: BackendSpec::Filesystem { root: "/var/lib/cask/builds".into() },
//!     gc_grace_hours: 24,
//! }])?;
//!
//! let mut writer = engine.create_writer("builds")?;
//! writer.put(b"artifact bytes");
//! writer.add_alias("artifact/linux", 1)?;
//! let handle = writer.complete(cask_types::BlobKind::new("artifact", 1)?)?;
//! engine.flush("builds", &handle).await?;
//! engine.write_ref("builds", "latest", &handle, RefOptions::keep_forever()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;

pub use config::NamespaceSpec;
pub use engine::{Engine, Namespace};
pub use error::{EngineError, EngineResult};
