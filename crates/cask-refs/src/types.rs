use std::time::Duration;

use serde::{Deserialize, Serialize};

use cask_codec::BlobLocator;
use cask_types::Timestamp;

/// Expiry options for a ref write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefOptions {
    /// How long the ref should live. `None` means forever.
    pub lifetime: Option<Duration>,
    /// With a lifetime: `false` fixes the expiry at write time, `true`
    /// lets the maintenance pass keep re-stamping it.
    pub extend: bool,
}

impl RefOptions {
    /// A ref that never expires.
    pub fn keep_forever() -> Self {
        Self::default()
    }

    /// A ref with a fixed lifetime, expiring `lifetime` after the write.
    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            lifetime: Some(lifetime),
            extend: false,
        }
    }

    /// A ref whose expiry is rolled forward by maintenance passes.
    pub fn extendable(lifetime: Duration) -> Self {
        Self {
            lifetime: Some(lifetime),
            extend: true,
        }
    }
}

/// One stored ref: a named root pointer with its expiry bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefRecord {
    /// The ref's name.
    pub name: String,
    /// The blob this ref points at. The locator carries both key and
    /// content hash, written as one atomic record, so a reader can never
    /// observe a key paired with a stale hash.
    pub target: BlobLocator,
    /// When the ref was last written.
    pub written_at: Timestamp,
    /// Nominal lifetime in milliseconds, if any.
    pub lifetime_ms: Option<u64>,
    /// Whether maintenance passes re-stamp the expiry.
    pub extend: bool,
    /// Absolute expiry. `None` means the ref never expires.
    pub expires_at: Option<Timestamp>,
}

impl RefRecord {
    /// Returns `true` if the ref has expired as of `now`.
    ///
    /// Expiry is inclusive: a ref with a 30-minute lifetime is readable
    /// strictly before the 30-minute mark and gone at it.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// The nominal lifetime as a `Duration`, if any.
    pub fn lifetime(&self) -> Option<Duration> {
        self.lifetime_ms.map(Duration::from_millis)
    }
}
