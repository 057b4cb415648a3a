//! Epoch boundaries.
//!
//! Epochs are fixed-length windows of block time counted from genesis.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Epoch position of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochInfo {
    pub current_epoch_index: u32,
    pub previous_epoch_index: Option<u32>,
    pub is_epoch_change: bool,
}

impl EpochInfo {
    pub const GENESIS: EpochInfo = EpochInfo {
        current_epoch_index: 0,
        previous_epoch_index: None,
        is_epoch_change: true,
    };

    /// Computes the epoch of a block. `previous_block_time_ms` is `None` for
    /// the first block after genesis, which always starts epoch tracking.
    pub fn calculate(
        genesis_time_ms: u64,
        block_time_ms: u64,
        previous_block_time_ms: Option<u64>,
        epoch_duration_ms: u64,
    ) -> Result<Self> {
        if epoch_duration_ms == 0 {
            return Err(Error::InvalidConfiguration(
                "epoch duration must be positive".to_string(),
            ));
        }

        let index_at = |time_ms: u64| -> Result<u32> {
            let elapsed = time_ms.saturating_sub(genesis_time_ms);
            u32::try_from(elapsed / epoch_duration_ms)
                .map_err(|_| Error::InvalidConfiguration(format!("epoch index overflow at {time_ms}")))
        };

        let current_epoch_index = index_at(block_time_ms)?;
        let previous_epoch_index = previous_block_time_ms.map(index_at).transpose()?;
        let is_epoch_change = previous_epoch_index != Some(current_epoch_index);

        Ok(Self {
            current_epoch_index,
            previous_epoch_index,
            is_epoch_change,
        })
    }
}
