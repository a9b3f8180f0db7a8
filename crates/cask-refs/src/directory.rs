use std::sync::Arc;

use tracing::{debug, info};

use cask_codec::BlobHandle;
use cask_store::{collect_prefix, ObjectStore, StoreError};
use cask_types::Clock;

use crate::error::{RefError, RefResult};
use crate::names::validate_ref_name;
use crate::types::{RefOptions, RefRecord};

/// Namespace-scoped directory of named root pointers.
///
/// Each ref is one JSON object at `refs/<name>`. Writes go through the
/// store's atomic object write, so concurrent writers of the same name are
/// last-writer-wins and a reader always sees a complete (key, hash) pair.
pub struct RefDirectory {
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
}

impl RefDirectory {
    /// Create a directory over a namespace's store.
    pub fn new(store: Arc<dyn ObjectStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn ref_key(name: &str) -> String {
        format!("refs/{name}")
    }

    /// Create or overwrite a ref pointing at `target`.
    pub async fn write(
        &self,
        name: &str,
        target: &BlobHandle,
        options: RefOptions,
    ) -> RefResult<()> {
        validate_ref_name(name)?;
        let now = self.clock.now();
        let record = RefRecord {
            name: name.to_string(),
            target: target.locator().clone(),
            written_at: now,
            lifetime_ms: options.lifetime.map(|d| d.as_millis() as u64),
            extend: options.extend,
            expires_at: options.lifetime.map(|d| now.plus(d)),
        };
        self.put_record(&record).await?;
        debug!(name, target = %record.target, extend = record.extend, "ref written");
        Ok(())
    }

    /// Read a ref. Fails with [`RefError::NotFound`] if it is absent or
    /// expired.
    pub async fn read(&self, name: &str) -> RefResult<RefRecord> {
        self.try_read(name).await?.ok_or_else(|| RefError::NotFound {
            name: name.to_string(),
        })
    }

    /// Read a ref, returning `None` if it is absent or expired.
    ///
    /// Backend failures surface as errors; a missing or lapsed ref is a
    /// normal outcome, not an operational problem.
    pub async fn try_read(&self, name: &str) -> RefResult<Option<RefRecord>> {
        validate_ref_name(name)?;
        let record = match self.store.read(&Self::ref_key(name)).await {
            Ok(data) => parse_record(&data)?,
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if record.is_expired(self.clock.now()) {
            debug!(name, "ref has expired");
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Administratively delete a ref. Returns `true` if it existed.
    pub async fn delete(&self, name: &str) -> RefResult<bool> {
        validate_ref_name(name)?;
        let existed = self.store.delete(&Self::ref_key(name)).await?;
        if existed {
            debug!(name, "ref deleted");
        }
        Ok(existed)
    }

    /// All refs that have not expired, in name order. These are the
    /// garbage collector's roots.
    pub async fn list_live(&self) -> RefResult<Vec<RefRecord>> {
        let now = self.clock.now();
        let metas = collect_prefix(self.store.as_ref(), "refs/").await?;
        let mut live = Vec::with_capacity(metas.len());
        for meta in metas {
            let data = self.store.read(&meta.key).await?;
            let record = parse_record(&data)?;
            if !record.is_expired(now) {
                live.push(record);
            }
        }
        Ok(live)
    }

    /// Re-stamp the expiry of every live extendable ref to
    /// `now + lifetime`.
    ///
    /// This is the rolling-minimum semantics for `extend = true`: the
    /// refresh runs on the periodic maintenance pass, independent of reads
    /// and writes, so an extendable ref outlives any number of nominal
    /// lifetimes as long as maintenance keeps running. Returns the number
    /// of refs refreshed.
    pub async fn refresh_extendable(&self) -> RefResult<usize> {
        let now = self.clock.now();
        let mut refreshed = 0usize;
        for mut record in self.list_live().await? {
            let Some(lifetime) = record.lifetime() else {
                continue;
            };
            if !record.extend {
                continue;
            }
            record.expires_at = Some(now.plus(lifetime));
            self.put_record(&record).await?;
            refreshed += 1;
        }
        if refreshed > 0 {
            info!(refreshed, "extended ref lifetimes");
        }
        Ok(refreshed)
    }

    async fn put_record(&self, record: &RefRecord) -> RefResult<()> {
        let data = serde_json::to_vec(record)
            .map_err(|e| RefError::Serialization(e.to_string()))?;
        self.store
            .write(&Self::ref_key(&record.name), data.into())
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for RefDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefDirectory").finish()
    }
}

fn parse_record(data: &[u8]) -> RefResult<RefRecord> {
    serde_json::from_slice(data).map_err(|e| RefError::Serialization(e.to_string()))
}
