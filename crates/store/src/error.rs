use thiserror::Error;

/// Errors raised by the state store and its backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store: a transaction is already open")]
    TransactionAlreadyStarted,

    #[error("store: no transaction is open")]
    TransactionNotStarted,

    #[error("store: transaction {0} is not the open transaction")]
    StaleTransaction(u64),

    #[error("store: writes outside the open transaction are not allowed")]
    WriteOutsideTransaction,

    #[error("store: chain state already initialized")]
    AlreadyInitialized,

    #[error("store: invalid path: {0}")]
    InvalidPath(String),

    #[error("store: corrupted key: {0}")]
    CorruptedKey(String),

    #[error("store: backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    #[inline]
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend(message.into())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
