//! Validator set lifecycle.
//!
//! The manager keeps the accepted set and at most one pending set. A pending
//! set is staged by [`ValidatorSetManager::initialize`] or
//! [`ValidatorSetManager::rotate`], reported to consensus as a
//! [`ValidatorSetUpdate`], and only becomes the quorum once the block that
//! staged it commits.

use std::collections::BTreeSet;
use std::sync::Arc;

use platform_config::VALIDATOR_VOTING_POWER;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core_chain::{CoreChainView, MasternodeEntry};
use crate::error::{Error, Result};
use crate::types::{hex_bytes, sha256, Bytes32, ProTxHash};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorMember {
    pub pro_tx_hash: ProTxHash,
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    pub voting_power: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    pub quorum_hash: Bytes32,
    pub core_height: u64,
    /// Sorted by pro_tx_hash.
    pub members: Vec<ValidatorMember>,
}

impl ValidatorSet {
    pub fn contains(&self, pro_tx_hash: &ProTxHash) -> bool {
        self.members
            .binary_search_by(|m| m.pro_tx_hash.cmp(pro_tx_hash))
            .is_ok()
    }
}

/// Membership change reported to consensus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSetUpdate {
    pub quorum_hash: Bytes32,
    pub added_members: Vec<ValidatorMember>,
    pub removed_members: Vec<ValidatorMember>,
}

impl ValidatorSetUpdate {
    pub fn between(previous: Option<&ValidatorSet>, next: &ValidatorSet) -> Self {
        let before: BTreeSet<ProTxHash> = previous
            .map(|set| set.members.iter().map(|m| m.pro_tx_hash).collect())
            .unwrap_or_default();
        let after: BTreeSet<ProTxHash> = next.members.iter().map(|m| m.pro_tx_hash).collect();

        Self {
            quorum_hash: next.quorum_hash,
            added_members: next
                .members
                .iter()
                .filter(|m| !before.contains(&m.pro_tx_hash))
                .cloned()
                .collect(),
            removed_members: previous
                .map(|set| {
                    set.members
                        .iter()
                        .filter(|m| !after.contains(&m.pro_tx_hash))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// Deterministic choice of quorum members.
pub trait QuorumSelector: Send + Sync {
    fn select(
        &self,
        masternodes: &[MasternodeEntry],
        core_height: u64,
        previous_app_hash: &Bytes32,
    ) -> ValidatorSet;
}

/// Picks the valid masternodes with the lowest `H(seed || pro_tx_hash)`,
/// where the seed is `H(core height BE || previous app hash)`.
#[derive(Debug, Clone)]
pub struct ScoredQuorumSelector {
    size: usize,
}

impl ScoredQuorumSelector {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl QuorumSelector for ScoredQuorumSelector {
    fn select(
        &self,
        masternodes: &[MasternodeEntry],
        core_height: u64,
        previous_app_hash: &Bytes32,
    ) -> ValidatorSet {
        let seed = sha256(&[&core_height.to_be_bytes()[..], previous_app_hash.as_ref()]);

        let mut scored: Vec<(Bytes32, &MasternodeEntry)> = masternodes
            .iter()
            .filter(|mn| mn.is_valid)
            .map(|mn| (sha256(&[seed.as_ref(), mn.pro_tx_hash.as_ref()]), mn))
            .collect();
        scored.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.pro_tx_hash.cmp(&b.1.pro_tx_hash)));
        scored.truncate(self.size);

        let mut members: Vec<ValidatorMember> = scored
            .into_iter()
            .map(|(_, mn)| ValidatorMember {
                pro_tx_hash: mn.pro_tx_hash,
                public_key: mn.operator_public_key.clone(),
                voting_power: VALIDATOR_VOTING_POWER,
            })
            .collect();
        members.sort_by(|a, b| a.pro_tx_hash.cmp(&b.pro_tx_hash));

        let mut parts: Vec<&[u8]> = vec![seed.as_ref()];
        parts.extend(members.iter().map(|m| m.pro_tx_hash.as_ref()));

        ValidatorSet {
            quorum_hash: sha256(&parts),
            core_height,
            members,
        }
    }
}

pub struct ValidatorSetManager {
    core: Arc<dyn CoreChainView>,
    selector: Box<dyn QuorumSelector>,
    rotation_blocks: u64,
    current: Option<ValidatorSet>,
    pending: Option<ValidatorSet>,
}

impl ValidatorSetManager {
    pub fn new(
        core: Arc<dyn CoreChainView>,
        selector: Box<dyn QuorumSelector>,
        rotation_blocks: u64,
        current: Option<ValidatorSet>,
    ) -> Result<Self> {
        if rotation_blocks == 0 {
            return Err(Error::InvalidConfiguration(
                "validator set rotation interval must be positive".to_string(),
            ));
        }
        Ok(Self {
            core,
            selector,
            rotation_blocks,
            current,
            pending: None,
        })
    }

    /// Stages the genesis validator set.
    pub fn initialize(&mut self, core_height: u64) -> Result<&ValidatorSet> {
        if self.current.is_some() {
            return Err(Error::ValidatorSet(
                "validator set is already initialized".to_string(),
            ));
        }
        self.stage(core_height, &Bytes32::ZERO)
    }

    /// Whether the block at `height` rotates the quorum.
    pub fn should_rotate(&self, height: u64, core_height_advanced: bool) -> bool {
        core_height_advanced && height % self.rotation_blocks == 0
    }

    /// Stages a set selected for `core_height`.
    pub fn rotate(&mut self, core_height: u64, previous_app_hash: &Bytes32) -> Result<&ValidatorSet> {
        self.stage(core_height, previous_app_hash)
    }

    fn stage(&mut self, core_height: u64, previous_app_hash: &Bytes32) -> Result<&ValidatorSet> {
        let masternodes = self.core.masternode_list(core_height).unwrap_or_default();
        let set = self.selector.select(&masternodes, core_height, previous_app_hash);
        debug!(
            core_height,
            quorum_hash = %set.quorum_hash,
            members = set.members.len(),
            "validator set staged"
        );
        let staged: &ValidatorSet = self.pending.insert(set);
        Ok(staged)
    }

    /// Accepted quorum. Never returns a staged set.
    pub fn get_quorum(&self) -> Option<&ValidatorSet> {
        self.current.as_ref()
    }

    pub fn pending(&self) -> Option<&ValidatorSet> {
        self.pending.as_ref()
    }

    /// Update for the staged set, if it differs from the accepted one.
    pub fn pending_update(&self) -> Option<ValidatorSetUpdate> {
        let next = self.pending.as_ref()?;
        if self.current.as_ref() == Some(next) {
            return None;
        }
        Some(ValidatorSetUpdate::between(self.current.as_ref(), next))
    }

    /// Replaces the quorum with the staged set.
    pub fn accept_pending(&mut self) {
        if let Some(next) = self.pending.take() {
            info!(quorum_hash = %next.quorum_hash, core_height = next.core_height, "validator set accepted");
            self.current = Some(next);
        }
    }

    pub fn discard_pending(&mut self) {
        self.pending = None;
    }
}
