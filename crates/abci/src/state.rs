//! Platform state that outlives a block.
//!
//! Loaded at startup and replaced only after a commit succeeds. The record
//! lives in the aux column and is written through the block's transaction,
//! so it is durable exactly when the block is.

use platform_config::PROTOCOL_VERSION;
use platform_store::{AuthenticatedStore, TransactionArg};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{decode, encode, PLATFORM_STATE_KEY};
use crate::types::Bytes32;
use crate::validators::ValidatorSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastCommittedBlock {
    pub height: u64,
    pub app_hash: Bytes32,
    pub time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformState {
    /// Core height the masternode registry reflects.
    pub last_synced_core_height: Option<u64>,
    pub last_committed_block: Option<LastCommittedBlock>,
    pub core_chain_locked_height: u64,
    pub genesis_time_ms: Option<u64>,
    /// Height of the first block after genesis.
    pub initial_height: u64,
    pub validator_set: Option<ValidatorSet>,
    /// Height of the last chain lock reported to consensus.
    pub last_chain_lock_height: u64,
    pub protocol_version: u32,
}

impl Default for PlatformState {
    fn default() -> Self {
        Self {
            last_synced_core_height: None,
            last_committed_block: None,
            core_chain_locked_height: 0,
            genesis_time_ms: None,
            initial_height: 1,
            validator_set: None,
            last_chain_lock_height: 0,
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

impl PlatformState {
    pub fn load(store: &dyn AuthenticatedStore) -> Result<Option<Self>> {
        store
            .get_aux(PLATFORM_STATE_KEY, None)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn store(&self, store: &dyn AuthenticatedStore, tx: TransactionArg) -> Result<()> {
        store.put_aux(PLATFORM_STATE_KEY, encode(self)?, tx)?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.last_committed_block.is_some()
    }

    pub fn last_block_height(&self) -> Option<u64> {
        self.last_committed_block.map(|block| block.height)
    }

    pub fn last_app_hash(&self) -> Bytes32 {
        self.last_committed_block
            .map(|block| block.app_hash)
            .unwrap_or(Bytes32::ZERO)
    }

    /// Time of the previous block for epoch tracking; `None` while the only
    /// committed block is genesis.
    pub fn previous_block_time_ms(&self) -> Option<u64> {
        self.last_committed_block
            .filter(|block| block.height + 1 != self.initial_height)
            .map(|block| block.time_ms)
    }
}
