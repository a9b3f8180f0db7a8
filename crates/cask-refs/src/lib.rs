//! Named root pointers into the blob graph.
//!
//! A ref maps a human-readable name to a blob locator. Refs are the only
//! externally reachable roots: anything not transitively reachable from a
//! live ref is garbage. Each ref optionally carries a lifetime — fixed at
//! write time, or extendable, in which case the periodic maintenance pass
//! re-stamps the expiry so actively maintained namespaces keep their roots
//! alive indefinitely.
//!
//! # Expiry semantics
//!
//! - No lifetime: the ref never expires by itself.
//! - `extend = false`: the ref becomes unreadable once
//!   `written_at + lifetime` passes, regardless of reads.
//! - `extend = true`: the expiry is a rolling minimum. Every maintenance
//!   pass (the same one that drives garbage collection) re-stamps
//!   `expires_at = now + lifetime`, independent of reads and writes.
//!
//! Readers distinguish "absent or expired" (a normal outcome, `None`)
//! from backend failure (an error) — the two are never conflated.

pub mod directory;
pub mod error;
pub mod names;
pub mod types;

pub use directory::RefDirectory;
pub use error::{RefError, RefResult};
pub use names::validate_ref_name;
pub use types::{RefOptions, RefRecord};
