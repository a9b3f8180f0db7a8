//! Foundation types for the cask blob storage engine.
//!
//! This crate provides the core identity, temporal, and control types used
//! throughout cask. Every other cask crate depends on `cask-types`.
//!
//! # Key Types
//!
//! - [`ContentHash`] — Content-addressed identifier (BLAKE3 hash)
//! - [`ContentHasher`] — Domain-separated hasher for content addressing
//! - [`BlobKind`] — Stable identifier + schema version tag for blob payloads
//! - [`Timestamp`] — Wall-clock milliseconds for expiry and grace periods
//! - [`Clock`] — Time source seam; [`SystemClock`] in production,
//!   [`ManualClock`] in tests
//! - [`CancelToken`] — Shared cancellation flag for long-running operations

pub mod cancel;
pub mod error;
pub mod hash;
pub mod kind;
pub mod temporal;

pub use cancel::CancelToken;
pub use error::TypeError;
pub use hash::{ContentHash, ContentHasher};
pub use kind::BlobKind;
pub use temporal::{Clock, ManualClock, SystemClock, Timestamp};
