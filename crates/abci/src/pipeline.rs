//! Block execution pipeline.
//!
//! Drives one block at a time through the lifecycle calls of the consensus
//! engine. Every block runs inside a single store transaction opened at
//! begin-block and committed at commit. A storage failure after the
//! transaction is open rolls the block back and halts the pipeline; calls
//! rejected before the transaction opens leave it running.

use std::fmt;
use std::sync::Arc;

use platform_config::{AbciConfig, MAX_STATE_TRANSITION_SIZE};
use platform_store::AuthenticatedStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, trace, warn};

use crate::block_info::BlockInfo;
use crate::chain_lock::CoreChainLockTracker;
use crate::context::BlockExecutionContext;
use crate::contracts::register_system_contracts;
use crate::core_chain::{CoreChainLock, CoreChainView};
use crate::epoch::EpochInfo;
use crate::error::{Error, Result};
use crate::fees::record_block_fees;
use crate::masternodes::{MasternodeDiffResult, MasternodeRegistrySynchronizer};
use crate::messages::{
    Event, RequestBeginBlock, RequestDeliverTx, RequestEndBlock, RequestInitChain,
    ResponseBeginBlock, ResponseCommit, ResponseDeliverTx, ResponseEndBlock, ResponseInfo,
    ResponseInitChain,
};
use crate::state::{LastCommittedBlock, PlatformState};
use crate::transaction::{TransactionId, TransactionalStateCoordinator};
use crate::transitions::TransitionExecutor;
use crate::types::Bytes32;
use crate::validators::{QuorumSelector, ScoredQuorumSelector, ValidatorSet, ValidatorSetManager};

/// Lifecycle position of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    /// No block is open
    Idle,
    /// Genesis state is being written
    ChainInitializing,
    /// Block transaction is open and accepts transitions
    BlockOpen,
    /// A transition is being executed
    TxDelivering,
    /// Block is finalized and waits for commit
    BlockEnding,
    /// Block transaction is being committed
    Committing,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "Idle"),
            PipelineState::ChainInitializing => write!(f, "ChainInitializing"),
            PipelineState::BlockOpen => write!(f, "BlockOpen"),
            PipelineState::TxDelivering => write!(f, "TxDelivering"),
            PipelineState::BlockEnding => write!(f, "BlockEnding"),
            PipelineState::Committing => write!(f, "Committing"),
        }
    }
}

impl PipelineState {
    /// Checks if a new block may begin
    pub fn can_begin_block(&self) -> bool {
        matches!(self, Self::Idle | Self::Committing)
    }

    /// Checks if a block transaction is open
    pub fn is_block_open(&self) -> bool {
        matches!(self, Self::BlockOpen | Self::TxDelivering | Self::BlockEnding)
    }
}

pub struct BlockExecutionPipeline {
    config: AbciConfig,
    coordinator: TransactionalStateCoordinator,
    synchronizer: MasternodeRegistrySynchronizer,
    validators: ValidatorSetManager,
    chain_locks: CoreChainLockTracker,
    executor: TransitionExecutor,
    platform_state: PlatformState,
    context: Option<BlockExecutionContext>,
    state: PipelineState,
    halted: Option<String>,
}

impl BlockExecutionPipeline {
    /// Opens the pipeline over `store`, restoring any committed state.
    pub fn new(
        config: AbciConfig,
        store: Arc<dyn AuthenticatedStore>,
        core: Arc<dyn CoreChainView>,
    ) -> Result<Self> {
        let selector = Box::new(ScoredQuorumSelector::new(config.validator_set_size));
        Self::with_selector(config, store, core, selector)
    }

    pub fn with_selector(
        config: AbciConfig,
        store: Arc<dyn AuthenticatedStore>,
        core: Arc<dyn CoreChainView>,
        selector: Box<dyn QuorumSelector>,
    ) -> Result<Self> {
        let mut coordinator = TransactionalStateCoordinator::new(store);
        coordinator.recover();

        let platform_state = match PlatformState::load(coordinator.store())? {
            Some(state) => state,
            None => PlatformState {
                protocol_version: config.protocol_version,
                ..Default::default()
            },
        };

        let synchronizer =
            MasternodeRegistrySynchronizer::new(core.clone(), platform_state.last_synced_core_height);
        let validators = ValidatorSetManager::new(
            core.clone(),
            selector,
            config.validator_set_rotation_blocks,
            platform_state.validator_set.clone(),
        )?;
        let chain_locks = CoreChainLockTracker::new(core, platform_state.last_chain_lock_height);
        let executor = TransitionExecutor::new(config.protocol_version, MAX_STATE_TRANSITION_SIZE);

        match platform_state.last_committed_block {
            Some(block) => info!(
                height = block.height,
                app_hash = %block.app_hash.to_upper_hex(),
                "restored platform state"
            ),
            None => info!(chain_id = %config.chain_id, "starting with an empty platform state"),
        }

        Ok(Self {
            config,
            coordinator,
            synchronizer,
            validators,
            chain_locks,
            executor,
            platform_state,
            context: None,
            state: PipelineState::Idle,
            halted: None,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn platform_state(&self) -> &PlatformState {
        &self.platform_state
    }

    pub fn context(&self) -> Option<&BlockExecutionContext> {
        self.context.as_ref()
    }

    pub fn store(&self) -> &dyn AuthenticatedStore {
        self.coordinator.store()
    }

    pub fn validator_set(&self) -> Option<&ValidatorSet> {
        self.validators.get_quorum()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn info(&self) -> ResponseInfo {
        ResponseInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: self.platform_state.protocol_version,
            last_block_height: self.platform_state.last_block_height().unwrap_or(0),
            last_block_app_hash: self.platform_state.last_app_hash(),
        }
    }

    /// Writes the genesis state and commits it.
    pub fn init_chain(&mut self, request: RequestInitChain) -> Result<ResponseInitChain> {
        let span = info_span!("abci", abci_method = "init_chain", height = request.initial_height);
        let _guard = span.enter();

        self.ensure_running()?;
        self.expect_state("init_chain", PipelineState::Idle == self.state)?;
        if let Some(height) = self.platform_state.last_block_height() {
            return Err(Error::ChainAlreadyInitialized { height });
        }
        debug!("InitChain ABCI method requested");

        let core_height = request
            .initial_core_height
            .unwrap_or(self.config.initial_core_chain_locked_height);

        // Preview of the genesis masternode list, logged only; the applied
        // pass runs inside the genesis transaction.
        let preview = self.synchronizer.synchronize(0, core_height)?;
        debug!(
            core_height,
            masternodes = preview.created_entities.len(),
            "masternode list at genesis"
        );

        let id = self.coordinator.begin()?;
        self.state = PipelineState::ChainInitializing;
        match self.init_chain_in_transaction(id, &request, core_height) {
            Ok(response) => {
                self.state = PipelineState::Committing;
                Ok(response)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn init_chain_in_transaction(
        &mut self,
        id: TransactionId,
        request: &RequestInitChain,
        core_height: u64,
    ) -> Result<ResponseInitChain> {
        let initial_height = request.initial_height.max(1);
        let genesis = BlockInfo::genesis(request.time_ms);
        let mut next_state = PlatformState {
            genesis_time_ms: Some(request.time_ms),
            initial_height,
            core_chain_locked_height: core_height,
            protocol_version: self.config.protocol_version,
            ..Default::default()
        };

        self.coordinator
            .store()
            .init_chain(Some(self.coordinator.transaction(id)?))?;
        register_system_contracts(
            self.coordinator.store(),
            Some(self.coordinator.transaction(id)?),
            &genesis,
        )?;

        let diff = self.synchronizer.synchronize(0, core_height)?;
        self.synchronizer.apply(
            &diff,
            self.coordinator.store(),
            Some(self.coordinator.transaction(id)?),
            &genesis,
        )?;
        log_masternode_sync(&diff);
        next_state.last_synced_core_height = Some(diff.to_height);

        let quorum_hash = self.validators.initialize(core_height)?.quorum_hash;
        trace!(quorum_hash = %quorum_hash, "genesis validator set selected");
        let validator_set_update = self.validators.pending_update();
        next_state.validator_set = self.validators.pending().cloned();

        let chain_lock_update = self.chain_lock_update(core_height)?;
        if let Some(lock) = &chain_lock_update {
            next_state.last_chain_lock_height = lock.height;
        }

        let app_hash = Bytes32(self.coordinator.root_hash(id)?);
        next_state.last_committed_block = Some(LastCommittedBlock {
            height: initial_height - 1,
            app_hash,
            time_ms: request.time_ms,
        });
        next_state.store(
            self.coordinator.store(),
            Some(self.coordinator.transaction(id)?),
        )?;

        self.coordinator.commit(id)?;
        self.accept_committed(&next_state, chain_lock_update.as_ref());
        self.platform_state = next_state;

        info!(
            chain_id = %request.chain_id,
            initial_height,
            core_height,
            app_hash = %app_hash.to_upper_hex(),
            "Init {} chain on block #{} with app hash {}",
            request.chain_id,
            initial_height,
            app_hash.to_upper_hex()
        );

        Ok(ResponseInitChain {
            app_hash,
            validator_set_update,
            initial_core_height: core_height,
            next_core_chain_lock_update: chain_lock_update,
        })
    }

    /// Opens the block transaction and syncs the masternode registry.
    pub fn begin_block(&mut self, request: RequestBeginBlock) -> Result<ResponseBeginBlock> {
        let span = info_span!("abci", abci_method = "begin_block", height = request.height);
        let _guard = span.enter();

        self.ensure_running()?;
        self.expect_state("begin_block", self.state.can_begin_block())?;
        let last = self
            .platform_state
            .last_committed_block
            .ok_or(Error::ChainNotInitialized)?;
        if request.height != last.height + 1 {
            return Err(Error::UnexpectedBlockHeight {
                expected: last.height + 1,
                actual: request.height,
            });
        }
        let previous_core_height = self.platform_state.core_chain_locked_height;
        if request.core_chain_locked_height < previous_core_height {
            return Err(Error::InvalidSyncRange {
                from: previous_core_height,
                to: request.core_chain_locked_height,
            });
        }
        let synced = self.platform_state.last_synced_core_height.unwrap_or(0);
        let observed = self.synchronizer.observed_height();
        if request.core_chain_locked_height > synced && request.core_chain_locked_height > observed
        {
            warn!(
                core_height = request.core_chain_locked_height,
                observed, "core chain view is behind the requested core height"
            );
            return Err(Error::CoreHeightNotObserved {
                requested: request.core_chain_locked_height,
                observed,
            });
        }

        let id = self.coordinator.begin()?;
        match self.begin_block_in_transaction(id, &request) {
            Ok(response) => {
                self.state = PipelineState::BlockOpen;
                Ok(response)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn begin_block_in_transaction(
        &mut self,
        id: TransactionId,
        request: &RequestBeginBlock,
    ) -> Result<ResponseBeginBlock> {
        let epoch_info = EpochInfo::calculate(
            self.platform_state.genesis_time_ms.unwrap_or(0),
            request.time_ms,
            self.platform_state.previous_block_time_ms(),
            self.config.epoch_duration_ms,
        )?;
        if epoch_info.is_epoch_change {
            info!(
                epoch = epoch_info.current_epoch_index,
                previous = ?epoch_info.previous_epoch_index,
                "epoch changed"
            );
        }
        let block_info = BlockInfo::new(request.height, epoch_info.current_epoch_index, request.time_ms);

        let from = self.platform_state.last_synced_core_height.unwrap_or(0);
        let diff = self
            .synchronizer
            .synchronize(from, request.core_chain_locked_height)?;
        self.synchronizer.apply(
            &diff,
            self.coordinator.store(),
            Some(self.coordinator.transaction(id)?),
            &block_info,
        )?;
        log_masternode_sync(&diff);

        let core_advanced =
            request.core_chain_locked_height > self.platform_state.core_chain_locked_height;
        if self.validators.should_rotate(request.height, core_advanced) {
            let previous_app_hash = self.platform_state.last_app_hash();
            self.validators
                .rotate(request.core_chain_locked_height, &previous_app_hash)?;
        }

        let mut next_state = self.platform_state.clone();
        next_state.last_synced_core_height = Some(diff.to_height);
        next_state.core_chain_locked_height = request.core_chain_locked_height;

        let mut context = BlockExecutionContext::new(
            block_info,
            epoch_info,
            id,
            request.core_chain_locked_height,
            next_state,
        );
        context.set_masternode_diff(diff.clone());
        self.context = Some(context);

        Ok(ResponseBeginBlock {
            masternode_diff: diff,
            epoch_info,
        })
    }

    /// Executes one transition. Invalid transitions come back with a
    /// non-zero code; only storage failures are errors.
    pub fn deliver_tx(&mut self, request: RequestDeliverTx) -> Result<ResponseDeliverTx> {
        self.ensure_running()?;
        self.expect_state("deliver_tx", self.state == PipelineState::BlockOpen)?;
        let (id, block_info) = match &self.context {
            Some(context) => (context.transaction(), *context.block_info()),
            None => return Err(self.fail(Error::NoOpenTransaction)),
        };

        let span = info_span!("abci", abci_method = "deliver_tx", height = block_info.height());
        let _guard = span.enter();

        self.state = PipelineState::TxDelivering;
        let executed = self.coordinator.transaction(id).and_then(|tx| {
            self.executor
                .execute(self.coordinator.store(), Some(tx), &block_info, &request.tx)
        });
        let result = match executed {
            Ok(result) => result,
            Err(err) => return Err(self.fail(err)),
        };

        if result.code.is_ok() {
            debug!(hash = %result.hash, fee = result.fee, "state transition applied");
        } else {
            debug!(hash = %result.hash, code = %result.code, info = %result.info, "state transition rejected");
        }
        if let Some(context) = self.context.as_mut() {
            context.record_transition(&result);
        }
        self.state = PipelineState::BlockOpen;

        let mut events = Vec::new();
        if let Some(transition_type) = result.transition_type {
            events.push(
                Event::new("stateTransition")
                    .with("type", transition_type)
                    .with("hash", result.hash)
                    .with("fee", result.fee),
            );
        }
        Ok(ResponseDeliverTx {
            code: result.code.code(),
            info: result.info,
            fee: result.fee,
            events,
        })
    }

    /// Records fees and reports validator and chain lock updates.
    pub fn end_block(&mut self, request: RequestEndBlock) -> Result<ResponseEndBlock> {
        let span = info_span!("abci", abci_method = "end_block", height = request.height);
        let _guard = span.enter();

        self.ensure_running()?;
        self.expect_state("end_block", self.state == PipelineState::BlockOpen)?;
        let height = match &self.context {
            Some(context) => context.block_info().height(),
            None => return Err(self.fail(Error::NoOpenTransaction)),
        };
        if request.height != height {
            return Err(Error::UnexpectedBlockHeight {
                expected: height,
                actual: request.height,
            });
        }

        match self.end_block_in_transaction() {
            Ok(response) => {
                self.state = PipelineState::BlockEnding;
                Ok(response)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn end_block_in_transaction(&mut self) -> Result<ResponseEndBlock> {
        let (id, block_info, epoch_info, fees, core_height) = match &self.context {
            Some(context) => (
                context.transaction(),
                *context.block_info(),
                *context.epoch_info(),
                context.fees(),
                context.core_chain_locked_height(),
            ),
            None => return Err(Error::NoOpenTransaction),
        };

        record_block_fees(
            self.coordinator.store(),
            Some(self.coordinator.transaction(id)?),
            &block_info,
            &epoch_info,
            fees,
        )?;

        let validator_set_update = self.validators.pending_update();
        let chain_lock_update = self.chain_lock_update(core_height)?;

        if let Some(context) = self.context.as_mut() {
            context.set_validator_set_update(validator_set_update.clone());
            context.set_chain_lock_update(chain_lock_update.clone());
        }

        Ok(ResponseEndBlock {
            validator_set_update,
            next_core_chain_lock_update: chain_lock_update,
            fees,
        })
    }

    /// Persists the platform state and commits the block transaction.
    pub fn commit(&mut self) -> Result<ResponseCommit> {
        let height = self
            .context
            .as_ref()
            .map(|context| context.block_info().height())
            .unwrap_or_default();
        let span = info_span!("abci", abci_method = "commit", height);
        let _guard = span.enter();

        self.ensure_running()?;
        self.expect_state("commit", self.state == PipelineState::BlockEnding)?;

        self.state = PipelineState::Committing;
        match self.commit_block() {
            Ok(response) => {
                self.state = PipelineState::Idle;
                Ok(response)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn commit_block(&mut self) -> Result<ResponseCommit> {
        let mut context = self.context.take().ok_or(Error::NoOpenTransaction)?;
        let id = context.transaction();
        let block_info = *context.block_info();
        let chain_lock_update = context.chain_lock_update().cloned();

        let app_hash = Bytes32(self.coordinator.root_hash(id)?);
        let next_state = context.next_state_mut();
        next_state.last_committed_block = Some(LastCommittedBlock {
            height: block_info.height(),
            app_hash,
            time_ms: block_info.time_ms(),
        });
        if let Some(set) = self.validators.pending() {
            next_state.validator_set = Some(set.clone());
        }
        if let Some(lock) = &chain_lock_update {
            next_state.last_chain_lock_height = lock.height;
        }
        next_state.store(
            self.coordinator.store(),
            Some(self.coordinator.transaction(id)?),
        )?;

        self.coordinator.commit(id)?;
        let next_state = context.next_state().clone();
        self.accept_committed(&next_state, chain_lock_update.as_ref());
        self.platform_state = next_state;

        info!(
            height = block_info.height(),
            epoch = block_info.epoch(),
            transitions = context.transitions().len(),
            fees = context.fees(),
            app_hash = %app_hash.to_upper_hex(),
            "block committed"
        );

        Ok(ResponseCommit {
            height: block_info.height(),
            app_hash,
        })
    }

    /// Moves every in-memory cursor to the state that was just committed.
    fn accept_committed(&mut self, committed: &PlatformState, chain_lock: Option<&CoreChainLock>) {
        if let Some(height) = committed.last_synced_core_height {
            self.synchronizer.advance(height);
        }
        self.validators.accept_pending();
        if let Some(lock) = chain_lock {
            self.chain_locks.accept(lock);
        }
    }

    /// Chain lock to report for `core_height`. An unverified lock is not an
    /// error for the block; the update is retried on a later one.
    fn chain_lock_update(&self, core_height: u64) -> Result<Option<CoreChainLock>> {
        match self
            .chain_locks
            .create_update(core_height, self.chain_locks.last_reported_height())
        {
            Ok(update) => Ok(update),
            Err(err) if err.is_transient() => {
                warn!(core_height, error = %err, "no chain lock update for this block");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        match &self.halted {
            Some(reason) => Err(Error::Halted(reason.clone())),
            None => Ok(()),
        }
    }

    fn expect_state(&self, call: &'static str, allowed: bool) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(Error::InvalidLifecycleCall {
                call,
                state: self.state,
            })
        }
    }

    /// Rolls back the open block and stops accepting work.
    fn fail(&mut self, err: Error) -> Error {
        if let Some(id) = self.coordinator.open_id() {
            if let Err(rollback_err) = self.coordinator.rollback(id) {
                error!(error = %rollback_err, "failed to roll back block transaction");
            }
        }
        self.validators.discard_pending();
        self.context = None;
        self.state = PipelineState::Idle;

        error!(error = %err, "block execution failed, halting");
        self.halted = Some(err.to_string());
        err
    }
}

fn log_masternode_sync(diff: &MasternodeDiffResult) {
    if diff.is_empty() {
        debug!(
            from = diff.from_height,
            to = diff.to_height,
            "masternode list unchanged"
        );
        return;
    }
    info!(
        from = diff.from_height,
        to = diff.to_height,
        created = diff.created_entities.len(),
        updated = diff.updated_entities.len(),
        removed = diff.removed_entities.len(),
        "Masternode identities are synced for heights from {} to {}",
        diff.from_height,
        diff.to_height
    );
    trace!(
        created = ?diff.created_entities.iter().map(|identity| identity.id).collect::<Vec<_>>(),
        removed = ?diff.removed_entities.iter().map(|identity| identity.id).collect::<Vec<_>>(),
        "masternode identity changes"
    );
}
