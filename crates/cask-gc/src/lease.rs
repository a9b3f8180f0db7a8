//! GC ownership lease, stored in the backend itself.
//!
//! Multiple server processes may host collectors for the same namespace;
//! the lease record at [`LEASE_KEY`] decides which one proceeds. A live
//! lease held by another owner makes the cycle a no-op for everyone else.
//! Leases expire, so a crashed owner only stalls collection for one TTL.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use cask_store::{ObjectStore, StoreError};
use cask_types::{Clock, Timestamp};

use crate::error::{GcError, GcResult};

/// Storage key of the lease record inside a namespace.
pub const LEASE_KEY: &str = "gc/lease";

/// The GC ownership record for one namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcLease {
    /// Identifier of the collector instance holding the lease.
    pub owner: String,
    /// When the lease was taken.
    pub acquired_at: Timestamp,
    /// When the lease lapses if not released.
    pub expires_at: Timestamp,
}

impl GcLease {
    /// Returns `true` if the lease has lapsed as of `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

/// Try to take the namespace lease for `owner`.
///
/// Fails with [`GcError::LeaseHeld`] if another owner holds a live lease.
/// Re-acquiring one's own lease refreshes it (covers a collector retrying
/// after a failed cycle).
pub async fn acquire(
    store: &dyn ObjectStore,
    clock: &dyn Clock,
    owner: &str,
    ttl: Duration,
) -> GcResult<GcLease> {
    let now = clock.now();
    match read(store).await? {
        Some(existing) if !existing.is_expired(now) && existing.owner != owner => {
            return Err(GcError::LeaseHeld {
                owner: existing.owner,
                expires_at: existing.expires_at,
            });
        }
        _ => {}
    }

    let lease = GcLease {
        owner: owner.to_string(),
        acquired_at: now,
        expires_at: now.plus(ttl),
    };
    let data =
        serde_json::to_vec(&lease).map_err(|e| GcError::Serialization(e.to_string()))?;
    store.write(LEASE_KEY, data.into()).await?;
    debug!(owner, expires_at = %lease.expires_at, "gc lease acquired");
    Ok(lease)
}

/// Release the lease if `owner` still holds it.
pub async fn release(store: &dyn ObjectStore, owner: &str) -> GcResult<()> {
    if let Some(existing) = read(store).await? {
        if existing.owner == owner {
            store.delete(LEASE_KEY).await?;
            debug!(owner, "gc lease released");
        }
    }
    Ok(())
}

/// Read the current lease record, if any.
pub async fn read(store: &dyn ObjectStore) -> GcResult<Option<GcLease>> {
    match store.read(LEASE_KEY).await {
        Ok(data) => {
            let lease = serde_json::from_slice(&data)
                .map_err(|e| GcError::Serialization(e.to_string()))?;
            Ok(Some(lease))
        }
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cask_store::InMemoryObjectStore;
    use cask_types::ManualClock;
    use std::sync::Arc;

    fn setup() -> (Arc<ManualClock>, InMemoryObjectStore) {
        let clock = Arc::new(ManualClock::starting_at(Timestamp::from_millis(1_000_000)));
        let store = InMemoryObjectStore::with_clock(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn acquire_and_release() {
        let (clock, store) = setup();
        let lease = acquire(&store, clock.as_ref(), "node-1", Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(lease.owner, "node-1");
        assert!(read(&store).await.unwrap().is_some());

        release(&store, "node-1").await.unwrap();
        assert!(read(&store).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn foreign_live_lease_blocks() {
        let (clock, store) = setup();
        acquire(&store, clock.as_ref(), "node-1", Duration::from_secs(600))
            .await
            .unwrap();

        let err = acquire(&store, clock.as_ref(), "node-2", Duration::from_secs(600))
            .await
            .unwrap_err();
        assert!(matches!(err, GcError::LeaseHeld { ref owner, .. } if owner == "node-1"));
    }

    #[tokio::test]
    async fn expired_foreign_lease_is_reclaimable() {
        let (clock, store) = setup();
        acquire(&store, clock.as_ref(), "node-1", Duration::from_secs(60))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(120));
        let lease = acquire(&store, clock.as_ref(), "node-2", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(lease.owner, "node-2");
    }

    #[tokio::test]
    async fn own_lease_is_refreshed_not_blocked() {
        let (clock, store) = setup();
        let first = acquire(&store, clock.as_ref(), "node-1", Duration::from_secs(60))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(30));
        let second = acquire(&store, clock.as_ref(), "node-1", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(second.expires_at > first.expires_at);
    }

    #[tokio::test]
    async fn release_by_non_owner_is_a_noop() {
        let (clock, store) = setup();
        acquire(&store, clock.as_ref(), "node-1", Duration::from_secs(600))
            .await
            .unwrap();
        release(&store, "node-2").await.unwrap();
        assert!(read(&store).await.unwrap().is_some());
    }
}
