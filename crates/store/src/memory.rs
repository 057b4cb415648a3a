use dashmap::DashMap;
use parking_lot::RwLock;

use crate::error::StoreResult;
use crate::traits::{Backend, BatchOp, ColumnId, WriteBatch};

/// Volatile backend keeping every column in a concurrent map.
#[derive(Default)]
pub struct MemoryBackend {
    columns: DashMap<ColumnId, DashMap<Vec<u8>, Vec<u8>>>,
    // Held exclusively while a batch is applied so readers never observe half of it.
    batch_guard: RwLock<()>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, column: ColumnId) -> usize {
        self.columns.get(&column).map(|col| col.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, column: ColumnId) -> bool {
        self.len(column) == 0
    }
}

impl Backend for MemoryBackend {
    fn get(&self, column: ColumnId, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let _read = self.batch_guard.read();
        Ok(self
            .columns
            .get(&column)
            .and_then(|col| col.value().get(key).map(|value| value.value().clone())))
    }

    fn scan_prefix(
        &self,
        column: ColumnId,
        prefix: &[u8],
    ) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let _read = self.batch_guard.read();
        let Some(col) = self.columns.get(&column) else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = col
            .value()
            .iter()
            .filter(|kv| kv.key().starts_with(prefix))
            .map(|kv| (kv.key().clone(), kv.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    fn write_batch(&self, batch: WriteBatch) -> StoreResult<()> {
        let _write = self.batch_guard.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { column, key, value } => {
                    self.columns
                        .entry(column)
                        .or_insert_with(DashMap::new)
                        .value()
                        .insert(key, value);
                }
                BatchOp::Delete { column, key } => {
                    if let Some(col) = self.columns.get(&column) {
                        col.value().remove(&key);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_applies_puts_and_deletes_in_order() {
        let backend = MemoryBackend::new();
        let mut batch = WriteBatch::new();
        batch.put(ColumnId::STATE, b"a".to_vec(), b"1".to_vec());
        batch.put(ColumnId::STATE, b"b".to_vec(), b"2".to_vec());
        batch.delete(ColumnId::STATE, b"a".to_vec());
        backend.write_batch(batch).unwrap();

        assert_eq!(backend.get(ColumnId::STATE, b"a").unwrap(), None);
        assert_eq!(backend.get(ColumnId::STATE, b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(backend.len(ColumnId::STATE), 1);
        assert!(backend.is_empty(ColumnId::AUX));
    }

    #[test]
    fn scan_is_sorted_and_column_scoped() {
        let backend = MemoryBackend::new();
        let mut batch = WriteBatch::new();
        batch.put(ColumnId::STATE, b"p2".to_vec(), vec![]);
        batch.put(ColumnId::STATE, b"p1".to_vec(), vec![]);
        batch.put(ColumnId::STATE, b"q1".to_vec(), vec![]);
        batch.put(ColumnId::AUX, b"p0".to_vec(), vec![]);
        backend.write_batch(batch).unwrap();

        let keys: Vec<_> = backend
            .scan_prefix(ColumnId::STATE, b"p")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"p1".to_vec(), b"p2".to_vec()]);
    }
}
