//! Fee schedule and per-epoch fee pools.

use platform_config::{BASE_TRANSITION_FEE, FEE_PER_BYTE};
use platform_store::{AuthenticatedStore, TransactionArg};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block_info::BlockInfo;
use crate::epoch::EpochInfo;
use crate::error::Result;
use crate::storage::{self, EPOCHS, POOLS};

/// Fee charged for a transition of `size` encoded bytes.
pub fn transition_fee(size: usize) -> u64 {
    BASE_TRANSITION_FEE.saturating_add(FEE_PER_BYTE.saturating_mul(size as u64))
}

/// Fees collected during one epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochPool {
    pub start_height: Option<u64>,
    pub start_time_ms: Option<u64>,
    pub collected_fees: u64,
}

impl EpochPool {
    pub fn fetch(
        store: &dyn AuthenticatedStore,
        epoch_index: u32,
        tx: TransactionArg,
    ) -> Result<Option<EpochPool>> {
        storage::fetch(store, &[POOLS, EPOCHS], &epoch_index.to_be_bytes(), tx)
    }

    fn save(&self, store: &dyn AuthenticatedStore, epoch_index: u32, tx: TransactionArg) -> Result<()> {
        storage::save(store, &[POOLS, EPOCHS], &epoch_index.to_be_bytes(), self, tx)
    }
}

/// Adds a block's fees to its epoch pool and stamps the epoch start on the
/// first block of an epoch. Blocks without fees outside an epoch change
/// leave the pool untouched.
pub fn record_block_fees(
    store: &dyn AuthenticatedStore,
    tx: TransactionArg,
    block_info: &BlockInfo,
    epoch_info: &EpochInfo,
    fees: u64,
) -> Result<()> {
    if fees == 0 && !epoch_info.is_epoch_change {
        return Ok(());
    }

    let epoch = epoch_info.current_epoch_index;
    let mut pool = EpochPool::fetch(store, epoch, tx)?.unwrap_or_default();
    if epoch_info.is_epoch_change && pool.start_height.is_none() {
        pool.start_height = Some(block_info.height());
        pool.start_time_ms = Some(block_info.time_ms());
        debug!(epoch, height = block_info.height(), "epoch started");
    }
    pool.collected_fees = pool.collected_fees.saturating_add(fees);
    pool.save(store, epoch, tx)
}
