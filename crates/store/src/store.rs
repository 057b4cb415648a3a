//! Transactional, authenticated state store.
//!
//! [`StateStore`] keeps an overlay of pending writes for the single open
//! transaction on top of a [`Backend`] holding committed data. Commit turns
//! the overlay into one atomic [`WriteBatch`]. Rollback clears the overlay.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::memory::MemoryBackend;
use crate::merkle::{self, Hash, Proof, ProvedEntry};
use crate::path::{encode_key, encode_path};
use crate::query::PathQuery;
use crate::traits::{Backend, ColumnId, WriteBatch};

/// Handle to the open store transaction.
///
/// Not `Clone`: committing or aborting consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct Transaction {
    id: u64,
}

impl Transaction {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Optional transaction scope for a store call.
pub type TransactionArg<'a> = Option<&'a Transaction>;

/// The operations the block execution engine needs from its storage.
///
/// Reads without a transaction observe committed data only. Writes without a
/// transaction are applied immediately, but only while no transaction is open.
pub trait AuthenticatedStore: Send + Sync {
    fn start_transaction(&self) -> StoreResult<Transaction>;
    fn commit_transaction(&self, transaction: Transaction) -> StoreResult<()>;
    /// Discards the writes made so far; the transaction stays open.
    fn rollback_transaction(&self, transaction: &Transaction) -> StoreResult<()>;
    /// Discards the writes and closes the transaction.
    fn abort_transaction(&self, transaction: Transaction) -> StoreResult<()>;
    /// Closes whatever transaction is open without its handle. Returns
    /// whether one was open.
    fn abort_open_transaction(&self) -> bool;
    fn is_transaction_started(&self) -> bool;

    fn get(&self, path: &[&[u8]], key: &[u8], tx: TransactionArg)
        -> StoreResult<Option<Vec<u8>>>;
    fn insert(&self, path: &[&[u8]], key: &[u8], value: Vec<u8>, tx: TransactionArg)
        -> StoreResult<()>;
    /// Returns false, writing nothing, when the key already exists.
    fn insert_if_not_exists(
        &self,
        path: &[&[u8]],
        key: &[u8],
        value: Vec<u8>,
        tx: TransactionArg,
    ) -> StoreResult<bool>;
    /// Returns whether the key existed.
    fn delete(&self, path: &[&[u8]], key: &[u8], tx: TransactionArg) -> StoreResult<bool>;
    /// Returns matching `(key, value)` pairs with keys relative to the path.
    fn query(&self, query: &PathQuery, tx: TransactionArg) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;
    fn prove_query(&self, query: &PathQuery, tx: TransactionArg) -> StoreResult<Proof>;
    fn root_hash(&self, tx: TransactionArg) -> StoreResult<Hash>;

    fn put_aux(&self, key: &[u8], value: Vec<u8>, tx: TransactionArg) -> StoreResult<()>;
    fn get_aux(&self, key: &[u8], tx: TransactionArg) -> StoreResult<Option<Vec<u8>>>;
    fn delete_aux(&self, key: &[u8], tx: TransactionArg) -> StoreResult<()>;

    /// Genesis hook, run inside the genesis transaction before any platform
    /// data is written. Fails when the store was already initialized.
    fn init_chain(&self, tx: TransactionArg) -> StoreResult<()>;

    fn flush(&self) -> StoreResult<()>;
}

const CHAIN_INITIALIZED: &[u8] = b"chain_initialized";

type PendingWrites = BTreeMap<(ColumnId, Vec<u8>), Option<Vec<u8>>>;

struct OpenTransaction {
    id: u64,
    writes: PendingWrites,
}

fn check<'a>(slot: &'a Option<OpenTransaction>, tx: &Transaction) -> StoreResult<&'a OpenTransaction> {
    match slot {
        Some(open) if open.id == tx.id => Ok(open),
        Some(_) => Err(StoreError::StaleTransaction(tx.id)),
        None => Err(StoreError::TransactionNotStarted),
    }
}

fn check_mut<'a>(
    slot: &'a mut Option<OpenTransaction>,
    tx: &Transaction,
) -> StoreResult<&'a mut OpenTransaction> {
    match slot {
        Some(open) if open.id == tx.id => Ok(open),
        Some(_) => Err(StoreError::StaleTransaction(tx.id)),
        None => Err(StoreError::TransactionNotStarted),
    }
}

/// Authenticated store over any [`Backend`].
pub struct StateStore<B: Backend> {
    backend: B,
    open: Mutex<Option<OpenTransaction>>,
    next_id: AtomicU64,
}

/// In-memory store, used by tests and ephemeral nodes.
pub type MemoryStore = StateStore<MemoryBackend>;

#[cfg(feature = "sled")]
pub type SledStore = StateStore<crate::sled_store::SledBackend>;

impl MemoryStore {
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(feature = "sled")]
impl SledStore {
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> StoreResult<Self> {
        Ok(Self::new(crate::sled_store::SledBackend::open(path)?))
    }
}

impl<B: Backend> StateStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            open: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn read(&self, column: ColumnId, flat: &[u8], tx: TransactionArg) -> StoreResult<Option<Vec<u8>>> {
        if let Some(tx) = tx {
            let guard = self.open.lock();
            let open = check(&guard, tx)?;
            if let Some(pending) = open.writes.get(&(column, flat.to_vec())) {
                return Ok(pending.clone());
            }
        }
        self.backend.get(column, flat)
    }

    /// Committed entries under `prefix` merged with the transaction's overlay.
    fn scan(&self, column: ColumnId, prefix: &[u8], tx: TransactionArg)
        -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let committed = self.backend.scan_prefix(column, prefix)?;
        let Some(tx) = tx else {
            return Ok(committed);
        };

        let guard = self.open.lock();
        let open = check(&guard, tx)?;
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = committed.into_iter().collect();
        for ((col, key), value) in open.writes.range((column, prefix.to_vec())..) {
            if *col != column || !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    fn write(
        &self,
        column: ColumnId,
        flat: Vec<u8>,
        value: Option<Vec<u8>>,
        tx: TransactionArg,
    ) -> StoreResult<()> {
        let mut guard = self.open.lock();
        match tx {
            Some(tx) => {
                check_mut(&mut guard, tx)?.writes.insert((column, flat), value);
                Ok(())
            }
            None if guard.is_some() => Err(StoreError::WriteOutsideTransaction),
            None => {
                let mut batch = WriteBatch::new();
                match value {
                    Some(value) => batch.put(column, flat, value),
                    None => batch.delete(column, flat),
                }
                self.backend.write_batch(batch)
            }
        }
    }

    fn state_key(path: &[&[u8]], key: &[u8]) -> StoreResult<Vec<u8>> {
        encode_key(path, key)
    }

    fn matched_entries(&self, query: &PathQuery, tx: TransactionArg)
        -> StoreResult<(Vec<u8>, Vec<(Vec<u8>, Vec<u8>)>)> {
        let prefix = encode_path(&query.path_segments())?;
        let relative = self
            .scan(ColumnId::STATE, &prefix, tx)?
            .into_iter()
            .map(|(flat, value)| (flat[prefix.len()..].to_vec(), value))
            .collect();
        Ok((prefix, query.apply(relative)))
    }
}

impl<B: Backend> AuthenticatedStore for StateStore<B> {
    fn start_transaction(&self) -> StoreResult<Transaction> {
        let mut guard = self.open.lock();
        if guard.is_some() {
            return Err(StoreError::TransactionAlreadyStarted);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        *guard = Some(OpenTransaction {
            id,
            writes: BTreeMap::new(),
        });
        debug!(target: "platform::store", transaction = id, "transaction started");
        Ok(Transaction { id })
    }

    fn commit_transaction(&self, transaction: Transaction) -> StoreResult<()> {
        let mut guard = self.open.lock();
        check(&guard, &transaction)?;
        let Some(open) = guard.take() else {
            return Err(StoreError::TransactionNotStarted);
        };

        let mut batch = WriteBatch::new();
        let writes = open.writes.len();
        for ((column, key), value) in open.writes {
            match value {
                Some(value) => batch.put(column, key, value),
                None => batch.delete(column, key),
            }
        }
        self.backend.write_batch(batch)?;
        debug!(
            target: "platform::store",
            transaction = open.id,
            writes,
            "transaction committed"
        );
        Ok(())
    }

    fn rollback_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        let mut guard = self.open.lock();
        check_mut(&mut guard, transaction)?.writes.clear();
        debug!(target: "platform::store", transaction = transaction.id, "transaction rolled back");
        Ok(())
    }

    fn abort_transaction(&self, transaction: Transaction) -> StoreResult<()> {
        let mut guard = self.open.lock();
        check(&guard, &transaction)?;
        *guard = None;
        debug!(target: "platform::store", transaction = transaction.id, "transaction aborted");
        Ok(())
    }

    fn abort_open_transaction(&self) -> bool {
        match self.open.lock().take() {
            Some(open) => {
                warn!(
                    target: "platform::store",
                    transaction = open.id,
                    pending_writes = open.writes.len(),
                    "aborting orphaned transaction"
                );
                true
            }
            None => false,
        }
    }

    fn is_transaction_started(&self) -> bool {
        self.open.lock().is_some()
    }

    fn get(&self, path: &[&[u8]], key: &[u8], tx: TransactionArg)
        -> StoreResult<Option<Vec<u8>>> {
        self.read(ColumnId::STATE, &Self::state_key(path, key)?, tx)
    }

    fn insert(&self, path: &[&[u8]], key: &[u8], value: Vec<u8>, tx: TransactionArg)
        -> StoreResult<()> {
        self.write(ColumnId::STATE, Self::state_key(path, key)?, Some(value), tx)
    }

    fn insert_if_not_exists(
        &self,
        path: &[&[u8]],
        key: &[u8],
        value: Vec<u8>,
        tx: TransactionArg,
    ) -> StoreResult<bool> {
        let flat = Self::state_key(path, key)?;
        if self.read(ColumnId::STATE, &flat, tx)?.is_some() {
            return Ok(false);
        }
        self.write(ColumnId::STATE, flat, Some(value), tx)?;
        Ok(true)
    }

    fn delete(&self, path: &[&[u8]], key: &[u8], tx: TransactionArg) -> StoreResult<bool> {
        let flat = Self::state_key(path, key)?;
        if self.read(ColumnId::STATE, &flat, tx)?.is_none() {
            return Ok(false);
        }
        self.write(ColumnId::STATE, flat, None, tx)?;
        Ok(true)
    }

    fn query(&self, query: &PathQuery, tx: TransactionArg) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self.matched_entries(query, tx)?.1)
    }

    fn prove_query(&self, query: &PathQuery, tx: TransactionArg) -> StoreResult<Proof> {
        let (prefix, matched) = self.matched_entries(query, tx)?;
        let all = self.scan(ColumnId::STATE, &[], tx)?;
        let leaves: Vec<Hash> = all.iter().map(|(k, v)| merkle::leaf_hash(k, v)).collect();

        let mut entries = Vec::with_capacity(matched.len());
        for (key, value) in matched {
            let mut flat = prefix.clone();
            flat.extend_from_slice(&key);
            let index = all
                .binary_search_by(|(k, _)| k.as_slice().cmp(flat.as_slice()))
                .map_err(|_| StoreError::CorruptedKey(hex::encode(&flat)))?;
            entries.push(ProvedEntry {
                flat_key: flat,
                value,
                steps: merkle::audit_path(&leaves, index),
            });
        }
        Ok(Proof {
            root_hash: merkle::root(&leaves),
            entries,
        })
    }

    fn root_hash(&self, tx: TransactionArg) -> StoreResult<Hash> {
        Ok(merkle::root_of_entries(&self.scan(ColumnId::STATE, &[], tx)?))
    }

    fn put_aux(&self, key: &[u8], value: Vec<u8>, tx: TransactionArg) -> StoreResult<()> {
        self.write(ColumnId::AUX, key.to_vec(), Some(value), tx)
    }

    fn get_aux(&self, key: &[u8], tx: TransactionArg) -> StoreResult<Option<Vec<u8>>> {
        self.read(ColumnId::AUX, key, tx)
    }

    fn delete_aux(&self, key: &[u8], tx: TransactionArg) -> StoreResult<()> {
        self.write(ColumnId::AUX, key.to_vec(), None, tx)
    }

    fn init_chain(&self, tx: TransactionArg) -> StoreResult<()> {
        if self.read(ColumnId::AUX, CHAIN_INITIALIZED, tx)?.is_some() {
            return Err(StoreError::AlreadyInitialized);
        }
        self.write(ColumnId::AUX, CHAIN_INITIALIZED.to_vec(), Some(vec![1]), tx)
    }

    fn flush(&self) -> StoreResult<()> {
        self.backend.flush()
    }
}
