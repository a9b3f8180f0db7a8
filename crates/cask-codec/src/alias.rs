use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use cask_store::{collect_prefix, ObjectStore};
use cask_types::{Clock, ContentHasher, Timestamp};

use crate::error::{CodecError, CodecResult};
use crate::handle::BlobLocator;

/// Hashes an alias string into the directory component of its records.
const ALIAS_DIR: ContentHasher = ContentHasher::new("cask-alias-v1");
/// Hashes one registration into its record key; excludes the timestamp so
/// republishing the same registration overwrites rather than duplicates.
const ALIAS_REG: ContentHasher = ContentHasher::new("cask-alias-reg-v1");

/// One alias registration as stored in the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct AliasRecord {
    alias: String,
    rank: u32,
    target: BlobLocator,
    registered_at: Timestamp,
}

/// One result of an alias lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AliasMatch {
    /// The alias string that matched.
    pub alias: String,
    /// Rank registered with the alias; lower sorts first.
    pub rank: u32,
    /// The blob the alias points at.
    pub target: BlobLocator,
    /// When the registration was (last) written.
    pub registered_at: Timestamp,
}

/// Namespace-scoped secondary lookup by human-meaningful string keys.
///
/// Multiple blobs may register the same alias; lookup returns all of them
/// ordered by rank, then registration time, then target key. Records live
/// under `aliases/<alias-digest>/<registration-hash>` so lookups for one
/// alias enumerate a single contiguous key range.
pub struct AliasDirectory {
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
}

impl AliasDirectory {
    /// Create a directory over a namespace's store.
    pub fn new(store: Arc<dyn ObjectStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn record_key(alias: &str, rank: u32, target: &BlobLocator) -> String {
        let dir = ALIAS_DIR.hash(alias.as_bytes()).to_hex();
        let mut reg_input = Vec::new();
        reg_input.extend_from_slice(alias.as_bytes());
        reg_input.extend_from_slice(&rank.to_le_bytes());
        reg_input.extend_from_slice(target.key.as_bytes());
        reg_input.extend_from_slice(target.hash.as_bytes());
        let reg = ALIAS_REG.hash(&reg_input).to_hex();
        format!("aliases/{dir}/{reg}")
    }

    /// Publish one alias registration for a blob.
    pub async fn publish(
        &self,
        alias: &str,
        rank: u32,
        target: &BlobLocator,
    ) -> CodecResult<()> {
        if alias.is_empty() {
            return Err(CodecError::InvalidAlias("alias must not be empty".into()));
        }
        let record = AliasRecord {
            alias: alias.to_string(),
            rank,
            target: target.clone(),
            registered_at: self.clock.now(),
        };
        let data = serde_json::to_vec(&record)
            .map_err(|e| CodecError::Serialization(e.to_string()))?;
        let key = Self::record_key(alias, rank, target);
        self.store.write(&key, data.into()).await?;
        debug!(alias, rank, target = %target, "alias published");
        Ok(())
    }

    /// All targets registered under `alias`, ordered by rank ascending,
    /// then registration time, then target key.
    pub async fn find(&self, alias: &str) -> CodecResult<Vec<AliasMatch>> {
        let dir = ALIAS_DIR.hash(alias.as_bytes()).to_hex();
        let prefix = format!("aliases/{dir}/");
        let metas = collect_prefix(self.store.as_ref(), &prefix).await?;

        let mut matches = Vec::with_capacity(metas.len());
        for meta in metas {
            let data = self.store.read(&meta.key).await?;
            let record: AliasRecord = serde_json::from_slice(&data)
                .map_err(|e| CodecError::Serialization(e.to_string()))?;
            // Digest collisions aside, every record in the range carries
            // this alias; keep the check anyway.
            if record.alias == alias {
                matches.push(AliasMatch {
                    alias: record.alias,
                    rank: record.rank,
                    target: record.target,
                    registered_at: record.registered_at,
                });
            }
        }
        matches.sort_by(|a, b| {
            a.rank
                .cmp(&b.rank)
                .then(a.registered_at.cmp(&b.registered_at))
                .then(a.target.key.cmp(&b.target.key))
        });
        Ok(matches)
    }

    /// Delete alias records whose target blob no longer exists.
    ///
    /// Called by the garbage collector after a sweep. Unparseable records
    /// are logged and left alone; a failed delete is logged and skipped.
    /// Returns the number of records removed.
    pub async fn prune_dangling(&self) -> CodecResult<usize> {
        let metas = collect_prefix(self.store.as_ref(), "aliases/").await?;
        let mut pruned = 0usize;
        for meta in metas {
            let data = self.store.read(&meta.key).await?;
            let record: AliasRecord = match serde_json::from_slice(&data) {
                Ok(r) => r,
                Err(e) => {
                    warn!(key = %meta.key, error = %e, "unparseable alias record; leaving in place");
                    continue;
                }
            };
            if self.store.exists(&record.target.key).await? {
                continue;
            }
            match self.store.delete(&meta.key).await {
                Ok(_) => {
                    debug!(alias = %record.alias, key = %meta.key, "pruned dangling alias");
                    pruned += 1;
                }
                Err(e) => {
                    warn!(key = %meta.key, error = %e, "failed to prune alias record");
                }
            }
        }
        Ok(pruned)
    }
}

impl std::fmt::Debug for AliasDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasDirectory").finish()
    }
}
