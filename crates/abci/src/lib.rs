//! Deterministic block execution for a masternode-backed platform chain.
//!
//! The consensus engine drives a [`BlockExecutionPipeline`] through
//! init-chain, begin-block, deliver-tx, end-block and commit. Each block
//! executes inside one transaction of a [`platform_store::AuthenticatedStore`]
//! and produces the store's root hash as its app hash.

pub mod application;
pub mod block_info;
pub mod chain_lock;
pub mod context;
pub mod contracts;
pub mod core_chain;
pub mod epoch;
pub mod error;
pub mod fees;
pub mod identity;
pub mod masternodes;
pub mod messages;
pub mod pipeline;
pub mod state;
pub mod storage;
pub mod transaction;
pub mod transitions;
pub mod types;
pub mod validators;

pub use application::{dispatch, AbciApplication, Application};
pub use block_info::BlockInfo;
pub use chain_lock::CoreChainLockTracker;
pub use context::BlockExecutionContext;
pub use core_chain::{CoreChainLock, CoreChainView, MasternodeEntry, MemoryCoreChain};
pub use epoch::EpochInfo;
pub use error::{Error, Result};
pub use identity::Identity;
pub use masternodes::{MasternodeDiffResult, MasternodeRegistrySynchronizer};
pub use pipeline::{BlockExecutionPipeline, PipelineState};
pub use state::PlatformState;
pub use transaction::{TransactionId, TransactionalStateCoordinator};
pub use types::{Bytes32, Identifier, ProTxHash};
pub use validators::{
    QuorumSelector, ScoredQuorumSelector, ValidatorSet, ValidatorSetManager, ValidatorSetUpdate,
};
