use crate::block_info::BlockInfo;
use crate::core_chain::CoreChainLock;
use crate::epoch::EpochInfo;
use crate::masternodes::MasternodeDiffResult;
use crate::state::PlatformState;
use crate::transaction::TransactionId;
use crate::transitions::{ResultCode, TransitionResult};
use crate::types::Bytes32;
use crate::validators::ValidatorSetUpdate;

/// Record of one delivered transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedTransition {
    pub hash: Bytes32,
    pub code: ResultCode,
    pub fee: u64,
}

/// Everything one block accumulates between begin-block and commit.
///
/// Created when the block's transaction opens and dropped at commit or
/// rollback.
#[derive(Debug, Clone)]
pub struct BlockExecutionContext {
    block_info: BlockInfo,
    epoch_info: EpochInfo,
    transaction: TransactionId,
    core_chain_locked_height: u64,
    transitions: Vec<ProcessedTransition>,
    fees: u64,
    masternode_diff: Option<MasternodeDiffResult>,
    validator_set_update: Option<ValidatorSetUpdate>,
    chain_lock_update: Option<CoreChainLock>,
    /// Platform state to persist if the block commits.
    next_state: PlatformState,
}

impl BlockExecutionContext {
    pub fn new(
        block_info: BlockInfo,
        epoch_info: EpochInfo,
        transaction: TransactionId,
        core_chain_locked_height: u64,
        next_state: PlatformState,
    ) -> Self {
        Self {
            block_info,
            epoch_info,
            transaction,
            core_chain_locked_height,
            transitions: Vec::new(),
            fees: 0,
            masternode_diff: None,
            validator_set_update: None,
            chain_lock_update: None,
            next_state,
        }
    }

    pub fn block_info(&self) -> &BlockInfo {
        &self.block_info
    }

    pub fn epoch_info(&self) -> &EpochInfo {
        &self.epoch_info
    }

    pub fn transaction(&self) -> TransactionId {
        self.transaction
    }

    pub fn core_chain_locked_height(&self) -> u64 {
        self.core_chain_locked_height
    }

    pub fn record_transition(&mut self, result: &TransitionResult) {
        self.fees = self.fees.saturating_add(result.fee);
        self.transitions.push(ProcessedTransition {
            hash: result.hash,
            code: result.code,
            fee: result.fee,
        });
    }

    pub fn transitions(&self) -> &[ProcessedTransition] {
        &self.transitions
    }

    pub fn fees(&self) -> u64 {
        self.fees
    }

    pub fn set_masternode_diff(&mut self, diff: MasternodeDiffResult) {
        self.masternode_diff = Some(diff);
    }

    pub fn masternode_diff(&self) -> Option<&MasternodeDiffResult> {
        self.masternode_diff.as_ref()
    }

    pub fn set_validator_set_update(&mut self, update: Option<ValidatorSetUpdate>) {
        self.validator_set_update = update;
    }

    pub fn validator_set_update(&self) -> Option<&ValidatorSetUpdate> {
        self.validator_set_update.as_ref()
    }

    pub fn set_chain_lock_update(&mut self, update: Option<CoreChainLock>) {
        self.chain_lock_update = update;
    }

    pub fn chain_lock_update(&self) -> Option<&CoreChainLock> {
        self.chain_lock_update.as_ref()
    }

    pub fn next_state(&self) -> &PlatformState {
        &self.next_state
    }

    pub fn next_state_mut(&mut self) -> &mut PlatformState {
        &mut self.next_state
    }
}
