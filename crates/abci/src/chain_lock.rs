use std::sync::Arc;

use tracing::debug;

use crate::core_chain::{CoreChainLock, CoreChainView};
use crate::error::{Error, Result};

/// Tracks the chain lock the platform has reported to consensus.
pub struct CoreChainLockTracker {
    core: Arc<dyn CoreChainView>,
    last_reported_height: u64,
}

impl CoreChainLockTracker {
    pub fn new(core: Arc<dyn CoreChainView>, last_reported_height: u64) -> Self {
        Self {
            core,
            last_reported_height,
        }
    }

    pub fn last_reported_height(&self) -> u64 {
        self.last_reported_height
    }

    /// Builds the next chain lock update for `locked_height`.
    ///
    /// Returns `Ok(None)` when the verified lock does not advance past
    /// `previous_height`, and [`Error::ChainLockUnavailable`] when no lock
    /// covering `locked_height` has been verified yet.
    pub fn create_update(
        &self,
        locked_height: u64,
        previous_height: u64,
    ) -> Result<Option<CoreChainLock>> {
        let lock = self
            .core
            .chain_lock(locked_height)
            .ok_or(Error::ChainLockUnavailable {
                height: locked_height,
            })?;

        if lock.height <= previous_height {
            debug!(
                core_height = lock.height,
                previous_height, "chain lock does not advance"
            );
            return Ok(None);
        }
        Ok(Some(lock))
    }

    /// Records a reported update. Heights never move backwards.
    pub fn accept(&mut self, update: &CoreChainLock) {
        self.last_reported_height = self.last_reported_height.max(update.height);
    }
}
