use serde::{Deserialize, Serialize};

/// Height, epoch and time of the block being executed.
///
/// Built once per block and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    height: u64,
    epoch: u32,
    time_ms: u64,
}

impl BlockInfo {
    pub const fn new(height: u64, epoch: u32, time_ms: u64) -> Self {
        Self {
            height,
            epoch,
            time_ms,
        }
    }

    /// Block info used while building the genesis state.
    pub const fn genesis(time_ms: u64) -> Self {
        Self::new(0, 0, time_ms)
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn time_ms(&self) -> u64 {
        self.time_ms
    }
}
