use std::fmt;

use crate::error::StoreResult;

/// Named identifier for a column family.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ColumnId(pub &'static str);

impl ColumnId {
    /// Authenticated state, hashed into the root.
    pub const STATE: ColumnId = ColumnId::new("state");
    /// Auxiliary node bookkeeping, never hashed.
    pub const AUX: ColumnId = ColumnId::new("aux");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    #[inline]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl From<&'static str> for ColumnId {
    #[inline]
    fn from(value: &'static str) -> Self {
        ColumnId::new(value)
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Operation to be applied via a write batch.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum BatchOp {
    Put {
        column: ColumnId,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        column: ColumnId,
        key: Vec<u8>,
    },
}

/// Ordered set of operations that should be applied atomically.
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    #[inline]
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    #[inline]
    pub fn put(&mut self, column: ColumnId, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put { column, key, value });
    }

    #[inline]
    pub fn delete(&mut self, column: ColumnId, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete { column, key });
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn operations(&self) -> &[BatchOp] {
        &self.ops
    }

    #[inline]
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Raw key-value engine holding committed data.
///
/// Backends know nothing about paths, transactions or hashing; they only
/// guarantee that a [`WriteBatch`] is applied atomically and, for persistent
/// engines, durably before `write_batch` returns.
pub trait Backend: Send + Sync {
    fn get(&self, column: ColumnId, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Returns every entry whose key starts with `prefix`, sorted by key.
    fn scan_prefix(&self, column: ColumnId, prefix: &[u8])
        -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;

    fn write_batch(&self, batch: WriteBatch) -> StoreResult<()>;

    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }
}
