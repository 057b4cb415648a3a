#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use platform_abci::messages::{
    RequestBeginBlock, RequestDeliverTx, RequestEndBlock, RequestInitChain, ResponseBeginBlock,
    ResponseCommit, ResponseDeliverTx, ResponseEndBlock, ResponseInitChain,
};
use platform_abci::transitions::{StateTransition, StateTransitionEnvelope};
use platform_abci::{
    BlockExecutionPipeline, Bytes32, CoreChainLock, Identifier, MasternodeEntry, MemoryCoreChain,
};
use platform_config::{AbciConfig, PROTOCOL_VERSION};
use platform_store::{
    AuthenticatedStore, Hash, MemoryStore, PathQuery, Proof, StoreError, StoreResult,
    Transaction, TransactionArg,
};

pub const GENESIS_TIME_MS: u64 = 1_700_000_000_000;
pub const BLOCK_INTERVAL_MS: u64 = 5_000;

pub fn config() -> AbciConfig {
    AbciConfig {
        chain_id: "platform-test".to_string(),
        initial_core_chain_locked_height: 1,
        validator_set_size: 3,
        validator_set_rotation_blocks: 2,
        epoch_duration_ms: 3_600_000,
        ..Default::default()
    }
}

pub fn init_request() -> RequestInitChain {
    RequestInitChain {
        chain_id: "platform-test".to_string(),
        initial_height: 1,
        time_ms: GENESIS_TIME_MS,
        initial_core_height: None,
    }
}

pub fn masternode(n: u8) -> MasternodeEntry {
    MasternodeEntry {
        pro_tx_hash: Bytes32([n; 32]),
        operator_public_key: vec![n; 48],
        voting_address: vec![n; 20],
        payout_address: vec![n; 25],
        is_valid: true,
    }
}

pub fn masternodes(ids: &[u8]) -> Vec<MasternodeEntry> {
    ids.iter().copied().map(masternode).collect()
}

pub fn chain_lock(height: u64) -> CoreChainLock {
    CoreChainLock {
        height,
        signature: vec![0xaa; 96],
    }
}

pub fn top_up(identity_id: Identifier, amount: u64) -> Vec<u8> {
    StateTransitionEnvelope::new(
        PROTOCOL_VERSION,
        StateTransition::IdentityTopUp {
            identity_id,
            amount,
        },
    )
    .to_bytes()
    .unwrap()
}

pub fn block_time(height: u64) -> u64 {
    GENESIS_TIME_MS + height * BLOCK_INTERVAL_MS
}

/// A pipeline over an in-memory store and core chain view.
pub struct Harness {
    pub core: Arc<MemoryCoreChain>,
    pub store: Arc<MemoryStore>,
    pub pipeline: BlockExecutionPipeline,
}

impl Harness {
    pub fn new(config: AbciConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(MemoryStore::in_memory()),
            Arc::new(MemoryCoreChain::new()),
        )
    }

    pub fn with_parts(
        config: AbciConfig,
        store: Arc<MemoryStore>,
        core: Arc<MemoryCoreChain>,
    ) -> Self {
        let pipeline = BlockExecutionPipeline::new(config, store.clone(), core.clone()).unwrap();
        Self {
            core,
            store,
            pipeline,
        }
    }

    pub fn init(&mut self) -> ResponseInitChain {
        self.pipeline.init_chain(init_request()).unwrap()
    }

    pub fn begin(&mut self, height: u64, core_height: u64) -> ResponseBeginBlock {
        self.begin_at(height, core_height, block_time(height))
    }

    pub fn begin_at(&mut self, height: u64, core_height: u64, time_ms: u64) -> ResponseBeginBlock {
        self.pipeline
            .begin_block(RequestBeginBlock {
                height,
                time_ms,
                core_chain_locked_height: core_height,
            })
            .unwrap()
    }

    pub fn deliver(&mut self, tx: Vec<u8>) -> ResponseDeliverTx {
        self.pipeline.deliver_tx(RequestDeliverTx { tx }).unwrap()
    }

    pub fn end(&mut self, height: u64) -> ResponseEndBlock {
        self.pipeline
            .end_block(RequestEndBlock { height })
            .unwrap()
    }

    pub fn commit(&mut self) -> ResponseCommit {
        self.pipeline.commit().unwrap()
    }

    /// Runs a whole block and returns its end-block and commit responses.
    pub fn run_block(
        &mut self,
        height: u64,
        core_height: u64,
        txs: &[Vec<u8>],
    ) -> (ResponseEndBlock, ResponseCommit) {
        self.begin(height, core_height);
        for tx in txs {
            self.deliver(tx.clone());
        }
        let end = self.end(height);
        (end, self.commit())
    }
}

/// Memory store whose writes can be made to fail on demand.
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
    fail_commit: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, enabled: bool) {
        self.fail_writes.store(enabled, Ordering::SeqCst);
    }

    pub fn fail_commit(&self, enabled: bool) {
        self.fail_commit.store(enabled, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend("injected write failure"));
        }
        Ok(())
    }
}

impl AuthenticatedStore for FailingStore {
    fn start_transaction(&self) -> StoreResult<Transaction> {
        self.inner.start_transaction()
    }

    fn commit_transaction(&self, transaction: Transaction) -> StoreResult<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(StoreError::backend("injected commit failure"));
        }
        self.inner.commit_transaction(transaction)
    }

    fn rollback_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        self.inner.rollback_transaction(transaction)
    }

    fn abort_transaction(&self, transaction: Transaction) -> StoreResult<()> {
        self.inner.abort_transaction(transaction)
    }

    fn abort_open_transaction(&self) -> bool {
        self.inner.abort_open_transaction()
    }

    fn is_transaction_started(&self) -> bool {
        self.inner.is_transaction_started()
    }

    fn get(&self, path: &[&[u8]], key: &[u8], tx: TransactionArg) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(path, key, tx)
    }

    fn insert(&self, path: &[&[u8]], key: &[u8], value: Vec<u8>, tx: TransactionArg) -> StoreResult<()> {
        self.check()?;
        self.inner.insert(path, key, value, tx)
    }

    fn insert_if_not_exists(
        &self,
        path: &[&[u8]],
        key: &[u8],
        value: Vec<u8>,
        tx: TransactionArg,
    ) -> StoreResult<bool> {
        self.check()?;
        self.inner.insert_if_not_exists(path, key, value, tx)
    }

    fn delete(&self, path: &[&[u8]], key: &[u8], tx: TransactionArg) -> StoreResult<bool> {
        self.check()?;
        self.inner.delete(path, key, tx)
    }

    fn query(&self, query: &PathQuery, tx: TransactionArg) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.query(query, tx)
    }

    fn prove_query(&self, query: &PathQuery, tx: TransactionArg) -> StoreResult<Proof> {
        self.inner.prove_query(query, tx)
    }

    fn root_hash(&self, tx: TransactionArg) -> StoreResult<Hash> {
        self.inner.root_hash(tx)
    }

    fn put_aux(&self, key: &[u8], value: Vec<u8>, tx: TransactionArg) -> StoreResult<()> {
        self.check()?;
        self.inner.put_aux(key, value, tx)
    }

    fn get_aux(&self, key: &[u8], tx: TransactionArg) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get_aux(key, tx)
    }

    fn delete_aux(&self, key: &[u8], tx: TransactionArg) -> StoreResult<()> {
        self.check()?;
        self.inner.delete_aux(key, tx)
    }

    fn init_chain(&self, tx: TransactionArg) -> StoreResult<()> {
        self.check()?;
        self.inner.init_chain(tx)
    }

    fn flush(&self) -> StoreResult<()> {
        self.inner.flush()
    }
}
