//! Block-scoped transaction discipline over the authenticated store.

use std::fmt;
use std::sync::Arc;

use platform_store::{AuthenticatedStore, Hash, Transaction};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Names the open block transaction. Copyable; the store transaction itself
/// stays inside the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owns the single open store transaction.
///
/// `commit` and `rollback` both release the handle, so releasing the same
/// handle twice fails with [`Error::NoOpenTransaction`].
pub struct TransactionalStateCoordinator {
    store: Arc<dyn AuthenticatedStore>,
    open: Option<(TransactionId, Transaction)>,
}

impl TransactionalStateCoordinator {
    pub fn new(store: Arc<dyn AuthenticatedStore>) -> Self {
        Self { store, open: None }
    }

    pub fn store(&self) -> &dyn AuthenticatedStore {
        self.store.as_ref()
    }

    pub fn begin(&mut self) -> Result<TransactionId> {
        if self.open.is_some() {
            return Err(Error::TransactionAlreadyOpen);
        }
        let transaction = self.store.start_transaction().map_err(|err| match err {
            platform_store::StoreError::TransactionAlreadyStarted => Error::TransactionAlreadyOpen,
            other => Error::Storage(other),
        })?;
        let id = TransactionId(transaction.id());
        debug!(transaction = %id, "block transaction opened");
        self.open = Some((id, transaction));
        Ok(id)
    }

    /// Commits durably; returns only after the store has persisted the batch.
    pub fn commit(&mut self, id: TransactionId) -> Result<()> {
        let transaction = self.release(id)?;
        if let Err(err) = self.store.commit_transaction(transaction) {
            if self.store.abort_open_transaction() {
                warn!(transaction = %id, "discarded block transaction after failed commit");
            }
            return Err(err.into());
        }
        debug!(transaction = %id, "block transaction committed");
        Ok(())
    }

    /// Discards every write made through the handle and releases it.
    pub fn rollback(&mut self, id: TransactionId) -> Result<()> {
        let transaction = self.release(id)?;
        self.store.abort_transaction(transaction)?;
        debug!(transaction = %id, "block transaction rolled back");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn open_id(&self) -> Option<TransactionId> {
        self.open.as_ref().map(|(id, _)| *id)
    }

    /// Store transaction behind `id`, for reads and writes in its scope.
    pub fn transaction(&self, id: TransactionId) -> Result<&Transaction> {
        match &self.open {
            Some((open, transaction)) if *open == id => Ok(transaction),
            Some(_) => Err(Error::StaleTransaction(id.get())),
            None => Err(Error::NoOpenTransaction),
        }
    }

    /// Root hash including everything written through `id` so far.
    pub fn root_hash(&self, id: TransactionId) -> Result<Hash> {
        let transaction = self.transaction(id)?;
        Ok(self.store.root_hash(Some(transaction))?)
    }

    /// Aborts a transaction left open by a crashed process. Returns whether
    /// one was found.
    pub fn recover(&mut self) -> bool {
        self.open = None;
        let aborted = self.store.abort_open_transaction();
        if aborted {
            warn!("rolled back orphaned block transaction");
        }
        aborted
    }

    fn release(&mut self, id: TransactionId) -> Result<Transaction> {
        match self.open.take() {
            Some((open, transaction)) if open == id => Ok(transaction),
            Some(other) => {
                self.open = Some(other);
                Err(Error::StaleTransaction(id.get()))
            }
            None => Err(Error::NoOpenTransaction),
        }
    }
}
