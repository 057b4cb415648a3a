//! Read-only view of the external core chain.
//!
//! Background observers publish masternode lists and verified chain locks
//! into a [`MemoryCoreChain`]; the pipeline only ever reads snapshots that are
//! already materialized, so a block never waits on the network.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{hex_bytes, ProTxHash};

/// One masternode as listed by the core chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasternodeEntry {
    pub pro_tx_hash: ProTxHash,
    #[serde(with = "hex_bytes")]
    pub operator_public_key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub voting_address: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub payout_address: Vec<u8>,
    /// False once the masternode is PoSe-banned.
    #[serde(default = "default_valid")]
    pub is_valid: bool,
}

fn default_valid() -> bool {
    true
}

/// A verified chain lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreChainLock {
    pub height: u64,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

/// Snapshot lookups against the core chain.
pub trait CoreChainView: Send + Sync {
    /// Masternode list at `height`; `None` when nothing at or below that
    /// height has been observed.
    fn masternode_list(&self, height: u64) -> Option<Vec<MasternodeEntry>>;

    /// The lowest verified chain lock at or above `height`. A lock finalizes
    /// every core block below it.
    fn chain_lock(&self, height: u64) -> Option<CoreChainLock>;

    fn best_chain_lock(&self) -> Option<CoreChainLock>;

    /// Highest core height whose masternode list is final in this view.
    /// Lists at or below it never change again.
    fn observed_height(&self) -> u64;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshots {
    masternode_lists: BTreeMap<u64, Vec<MasternodeEntry>>,
    chain_locks: BTreeMap<u64, CoreChainLock>,
    observed_height: u64,
}

/// On-disk form of published snapshots.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CoreSnapshotFile {
    #[serde(default)]
    pub masternode_lists: Vec<MasternodeListSnapshot>,
    #[serde(default)]
    pub chain_locks: Vec<CoreChainLock>,
    /// Declares the list final up to this height even without a snapshot
    /// there. Defaults to the highest listed height.
    #[serde(default)]
    pub observed_height: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasternodeListSnapshot {
    pub height: u64,
    pub masternodes: Vec<MasternodeEntry>,
}

/// In-process core chain view fed by observers.
#[derive(Debug, Default)]
pub struct MemoryCoreChain {
    snapshots: RwLock<Snapshots>,
}

impl MemoryCoreChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot_file(mut file: CoreSnapshotFile) -> Self {
        let chain = Self::new();
        file.masternode_lists.sort_by_key(|snapshot| snapshot.height);
        for snapshot in file.masternode_lists {
            chain.publish_masternode_list(snapshot.height, snapshot.masternodes);
        }
        for lock in file.chain_locks {
            chain.publish_chain_lock(lock);
        }
        if let Some(height) = file.observed_height {
            chain.mark_observed(height);
        }
        chain
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: CoreSnapshotFile = serde_json::from_str(json)?;
        Ok(Self::from_snapshot_file(file))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::CoreChain(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    /// Records the list observed at `height` and marks the view final up to
    /// it. Lists below the observed height are ignored: blocks may already
    /// have synced past them.
    pub fn publish_masternode_list(&self, height: u64, mut masternodes: Vec<MasternodeEntry>) {
        let mut snapshots = self.snapshots.write();
        if height < snapshots.observed_height {
            warn!(
                height,
                observed = snapshots.observed_height,
                "ignoring masternode list below the observed height"
            );
            return;
        }
        masternodes.sort_by(|a, b| a.pro_tx_hash.cmp(&b.pro_tx_hash));
        debug!(height, count = masternodes.len(), "masternode list published");
        snapshots.masternode_lists.insert(height, masternodes);
        snapshots.observed_height = height;
    }

    /// Declares that the list did not change between the last published
    /// snapshot and `height`.
    pub fn mark_observed(&self, height: u64) {
        let mut snapshots = self.snapshots.write();
        snapshots.observed_height = snapshots.observed_height.max(height);
    }

    pub fn publish_chain_lock(&self, lock: CoreChainLock) {
        debug!(height = lock.height, "chain lock published");
        self.snapshots.write().chain_locks.insert(lock.height, lock);
    }

    pub fn to_snapshot_file(&self) -> CoreSnapshotFile {
        let snapshots = self.snapshots.read();
        CoreSnapshotFile {
            masternode_lists: snapshots
                .masternode_lists
                .iter()
                .map(|(height, masternodes)| MasternodeListSnapshot {
                    height: *height,
                    masternodes: masternodes.clone(),
                })
                .collect(),
            chain_locks: snapshots.chain_locks.values().cloned().collect(),
            observed_height: Some(snapshots.observed_height),
        }
    }
}

impl CoreChainView for MemoryCoreChain {
    fn masternode_list(&self, height: u64) -> Option<Vec<MasternodeEntry>> {
        self.snapshots
            .read()
            .masternode_lists
            .range(..=height)
            .next_back()
            .map(|(_, list)| list.clone())
    }

    fn chain_lock(&self, height: u64) -> Option<CoreChainLock> {
        self.snapshots
            .read()
            .chain_locks
            .range(height..)
            .next()
            .map(|(_, lock)| lock.clone())
    }

    fn best_chain_lock(&self) -> Option<CoreChainLock> {
        self.snapshots
            .read()
            .chain_locks
            .values()
            .next_back()
            .cloned()
    }

    fn observed_height(&self) -> u64 {
        self.snapshots.read().observed_height
    }
}
