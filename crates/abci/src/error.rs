use platform_store::StoreError;
use thiserror::Error;

use crate::pipeline::PipelineState;

/// Block execution errors
#[derive(Debug, Error)]
pub enum Error {
    /// Storage collaborator failure
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// No verified chain lock covers the requested core height yet
    #[error("Chain lock for core height {height} is not available yet")]
    ChainLockUnavailable { height: u64 },

    /// The core chain view has not seen the requested height yet
    #[error("Core height {requested} is not observed yet, the core chain view is at {observed}")]
    CoreHeightNotObserved { requested: u64, observed: u64 },

    /// Masternode sync window runs backwards
    #[error("Invalid masternode sync range: to height {to} is below from height {from}")]
    InvalidSyncRange { from: u64, to: u64 },

    /// A second block transaction was requested
    #[error("A block transaction is already open")]
    TransactionAlreadyOpen,

    /// Commit or rollback without an open block transaction
    #[error("No block transaction is open")]
    NoOpenTransaction,

    /// Handle does not name the open block transaction
    #[error("Transaction {0} is not the open block transaction")]
    StaleTransaction(u64),

    /// Lifecycle call arrived out of order
    #[error("{call} is not allowed while the pipeline is {state}")]
    InvalidLifecycleCall {
        call: &'static str,
        state: PipelineState,
    },

    /// Block height does not follow the last committed block
    #[error("Unexpected block height: expected {expected}, got {actual}")]
    UnexpectedBlockHeight { expected: u64, actual: u64 },

    /// Chain already has a genesis state
    #[error("Chain is already initialized at height {height}")]
    ChainAlreadyInitialized { height: u64 },

    /// Block requested before init-chain
    #[error("Chain is not initialized")]
    ChainNotInitialized,

    /// External chain view error
    #[error("Core chain error: {0}")]
    CoreChain(String),

    /// Validator set error
    #[error("Validator set error: {0}")]
    ValidatorSet(String),

    /// Configuration value the engine cannot work with
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Pipeline refuses work after a fatal error
    #[error("Block processing halted: {0}")]
    Halted(String),
}

impl Error {
    /// Caller may resubmit on a later block.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ChainLockUnavailable { .. } | Error::CoreHeightNotObserved { .. }
        )
    }

    /// Programming or configuration error; never retried.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Error::InvalidSyncRange { .. }
                | Error::TransactionAlreadyOpen
                | Error::NoOpenTransaction
                | Error::StaleTransaction(_)
                | Error::InvalidLifecycleCall { .. }
                | Error::UnexpectedBlockHeight { .. }
                | Error::ChainAlreadyInitialized { .. }
                | Error::ChainNotInitialized
                | Error::InvalidConfiguration(_)
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for block execution operations
pub type Result<T> = std::result::Result<T, Error>;
