//! Masternode registry synchronization.
//!
//! The registry mirrors the core chain's masternode list as identities.
//! [`MasternodeRegistrySynchronizer::synchronize`] diffs two list snapshots
//! without touching storage; [`MasternodeRegistrySynchronizer::apply`] writes
//! the result through the open block transaction.

use std::collections::BTreeMap;
use std::sync::Arc;

use platform_store::{AuthenticatedStore, TransactionArg};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::block_info::BlockInfo;
use crate::core_chain::{CoreChainView, MasternodeEntry};
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::types::ProTxHash;

/// Identity changes between two core heights.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasternodeDiffResult {
    pub created_entities: Vec<Identity>,
    pub updated_entities: Vec<Identity>,
    pub removed_entities: Vec<Identity>,
    pub from_height: u64,
    pub to_height: u64,
}

impl MasternodeDiffResult {
    pub fn is_empty(&self) -> bool {
        self.created_entities.is_empty()
            && self.updated_entities.is_empty()
            && self.removed_entities.is_empty()
    }
}

pub struct MasternodeRegistrySynchronizer {
    core: Arc<dyn CoreChainView>,
    /// Core height the registry reflects; `None` before the first sync.
    synced_height: Option<u64>,
}

impl MasternodeRegistrySynchronizer {
    pub fn new(core: Arc<dyn CoreChainView>, synced_height: Option<u64>) -> Self {
        Self {
            core,
            synced_height,
        }
    }

    pub fn synced_height(&self) -> Option<u64> {
        self.synced_height
    }

    /// Height up to which the core view's lists are final.
    pub fn observed_height(&self) -> u64 {
        self.core.observed_height()
    }

    /// Moves the cursor once a diff is durably applied.
    pub fn advance(&mut self, height: u64) {
        self.synced_height = Some(self.synced_height.map_or(height, |h| h.max(height)));
    }

    /// Diffs the list at `from_height` against the list at `to_height`.
    ///
    /// Heights the registry already reflects are skipped, so repeating a sync
    /// after it was applied yields an empty diff. Before the first sync the
    /// registry is empty and every listed masternode is a creation.
    pub fn synchronize(&self, from_height: u64, to_height: u64) -> Result<MasternodeDiffResult> {
        if to_height < from_height {
            return Err(Error::InvalidSyncRange {
                from: from_height,
                to: to_height,
            });
        }

        let from = self.synced_height.map_or(from_height, |h| h.max(from_height));
        let to = to_height.max(from);

        let previous = match self.synced_height {
            Some(_) => self.list_at(from),
            None => BTreeMap::new(),
        };
        let current = self.list_at(to);

        let mut diff = MasternodeDiffResult {
            from_height: from,
            to_height: to,
            ..Default::default()
        };

        for (pro_tx_hash, entry) in &current {
            match previous.get(pro_tx_hash) {
                None => diff.created_entities.push(Identity::from_masternode(entry)),
                Some(old) if old != entry => {
                    diff.updated_entities.push(Identity::from_masternode(entry))
                }
                Some(_) => {}
            }
        }
        for (pro_tx_hash, entry) in &previous {
            if !current.contains_key(pro_tx_hash) {
                let mut identity = Identity::from_masternode(entry);
                identity.mark_removed();
                diff.removed_entities.push(identity);
            }
        }

        Ok(diff)
    }

    /// Writes a diff to the registry: creations, then updates, then removals.
    pub fn apply(
        &self,
        diff: &MasternodeDiffResult,
        store: &dyn AuthenticatedStore,
        tx: TransactionArg,
        block_info: &BlockInfo,
    ) -> Result<()> {
        for created in &diff.created_entities {
            let identity = match Identity::fetch(store, &created.id, tx)? {
                // Re-registration of a tombstoned masternode.
                Some(mut existing) => {
                    existing.apply_masternode_change(created);
                    existing
                }
                None => created.clone(),
            };
            identity.save(store, tx)?;
        }

        for updated in &diff.updated_entities {
            let identity = match Identity::fetch(store, &updated.id, tx)? {
                Some(mut existing) => {
                    existing.apply_masternode_change(updated);
                    existing
                }
                None => {
                    warn!(pro_tx_hash = %updated.id, "updated masternode has no identity, creating it");
                    updated.clone()
                }
            };
            identity.save(store, tx)?;
        }

        for removed in &diff.removed_entities {
            match Identity::fetch(store, &removed.id, tx)? {
                Some(mut existing) => {
                    existing.mark_removed();
                    existing.save(store, tx)?;
                }
                None => warn!(pro_tx_hash = %removed.id, "removed masternode has no identity"),
            }
        }

        trace!(
            height = block_info.height(),
            created = diff.created_entities.len(),
            updated = diff.updated_entities.len(),
            removed = diff.removed_entities.len(),
            "masternode identities applied"
        );
        Ok(())
    }

    fn list_at(&self, height: u64) -> BTreeMap<ProTxHash, MasternodeEntry> {
        self.core
            .masternode_list(height)
            .unwrap_or_default()
            .into_iter()
            .map(|entry| (entry.pro_tx_hash, entry))
            .collect()
    }
}
