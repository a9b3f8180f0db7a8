//! Namespace-scoped mark-and-sweep garbage collection.
//!
//! Each namespace's collector runs Idle → Scanning → Sweeping → Idle on a
//! fixed interval. Scanning walks the blob graph from every live ref with
//! a visited set; Sweeping deletes unreachable `blobs/**` keys whose last
//! write is older than the namespace's grace period. The grace period is
//! what keeps the collector from racing an in-flight tree build whose root
//! ref has not been published yet: such blobs are unreachable by design
//! for a short window, and they are always young.
//!
//! Multiple server processes cooperate through a lease record stored in
//! the backend itself — only the lease holder sweeps, so no two cycles of
//! one namespace overlap even across machines.
//!
//! Failure posture: a scan failure aborts the cycle before anything is
//! deleted (conservatism over completeness); sweep failures are per-key,
//! logged, and skipped.

pub mod collector;
pub mod error;
pub mod lease;

pub use collector::{Collector, GcConfig, GcPhase, GcReport};
pub use error::{GcError, GcResult};
pub use lease::{GcLease, LEASE_KEY};
