use std::path::Path;

use sled::{Batch, Db, Tree};

use crate::{
    error::{StoreError, StoreResult},
    traits::{Backend, BatchOp, ColumnId, WriteBatch},
};

const TREE_NAME: &str = "platform";

/// Persistent backend on top of the `sled` embedded database.
///
/// All columns share one tree, each key prefixed with its column name, so a
/// batch touching several columns lands in a single atomic `apply_batch`.
pub struct SledBackend {
    db: Db,
    tree: Tree,
}

impl SledBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path).map_err(|err| StoreError::backend(err.to_string()))?;
        let tree = db
            .open_tree(TREE_NAME)
            .map_err(|err| StoreError::backend(err.to_string()))?;
        Ok(Self { db, tree })
    }

    fn column_key(column: ColumnId, key: &[u8]) -> Vec<u8> {
        let name = column.name().as_bytes();
        let mut out = Vec::with_capacity(1 + name.len() + key.len());
        out.push(name.len() as u8);
        out.extend_from_slice(name);
        out.extend_from_slice(key);
        out
    }
}

impl Backend for SledBackend {
    fn get(&self, column: ColumnId, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.tree
            .get(Self::column_key(column, key))
            .map_err(|err| StoreError::backend(err.to_string()))
            .map(|opt| opt.map(|ivec| ivec.as_ref().to_vec()))
    }

    fn scan_prefix(
        &self,
        column: ColumnId,
        prefix: &[u8],
    ) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let full_prefix = Self::column_key(column, prefix);
        let column_len = full_prefix.len() - prefix.len();
        let mut entries = Vec::new();
        for item in self.tree.scan_prefix(&full_prefix) {
            let (key, value) = item.map_err(|err| StoreError::backend(err.to_string()))?;
            entries.push((key[column_len..].to_vec(), value.as_ref().to_vec()));
        }
        Ok(entries)
    }

    fn write_batch(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut sled_batch = Batch::default();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { column, key, value } => {
                    sled_batch.insert(Self::column_key(column, &key), value);
                }
                BatchOp::Delete { column, key } => {
                    sled_batch.remove(Self::column_key(column, &key));
                }
            }
        }
        self.tree
            .apply_batch(sled_batch)
            .map_err(|err| StoreError::backend(err.to_string()))?;
        self.flush()
    }

    fn flush(&self) -> StoreResult<()> {
        self.db
            .flush()
            .map_err(|err| StoreError::backend(err.to_string()))?;
        Ok(())
    }
}
