use anyhow::Context;
use dashmap::DashMap;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::core::error::StoreError;
use crate::stores::kv::KeyValueStore;
use crate::wal::wal::{validate_key, Wal, WalOperation};

/// Durable store backed by an append-only operation log
///
/// Reads are served from an in-memory index rebuilt by replaying the log
/// on open. Every write is appended and flushed before the index changes.
pub struct FileStore {
    wal: Wal,
    index: DashMap<String, Vec<u8>>,
}

impl FileStore {
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let wal = Wal::new(path).context("Failed to open store log")?;
        let operations = wal.replay().context("Failed to replay store log")?;

        let index = DashMap::new();
        for op in &operations {
            match op {
                WalOperation::Set { key, value } => {
                    index.insert(key.clone(), value.clone());
                }
                WalOperation::Delete { key } => {
                    index.remove(key);
                }
            }
        }

        info!(
            path = %wal.path().display(),
            operations_replayed = operations.len(),
            records = index.len(),
            "Store log replayed"
        );

        Ok(Self { wal, index })
    }

    /// Rewrite the log so it holds one `SET` per live record
    pub fn compact(&self) -> Result<usize, StoreError> {
        let mut entries: Vec<(String, Vec<u8>)> = self
            .index
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let operations: Vec<WalOperation> = entries
            .into_iter()
            .map(|(key, value)| WalOperation::Set { key, value })
            .collect();

        self.wal
            .rewrite(&operations)
            .context("Failed to compact store log")?;

        info!(records = operations.len(), "Store log compacted");
        Ok(operations.len())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.index.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        validate_key(key).map_err(|e| StoreError::InvalidKey(e.to_string()))?;
        self.wal.log_operation(&WalOperation::Set {
            key: key.to_string(),
            value: value.to_vec(),
        })?;
        self.index.insert(key.to_string(), value.to_vec());
        debug!(key, bytes = value.len(), "Record written");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key).map_err(|e| StoreError::InvalidKey(e.to_string()))?;
        if self.index.contains_key(key) {
            self.wal.log_operation(&WalOperation::Delete {
                key: key.to_string(),
            })?;
            self.index.remove(key);
            debug!(key, "Record deleted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bureau.db");

        {
            let store = FileStore::open(path.clone()).unwrap();
            store.set("users_data", b"[1]").unwrap();
            store.set("keys_data", b"[2]").unwrap();
            store.set("users_data", b"[3]").unwrap();
            store.delete("keys_data").unwrap();
        }

        let store = FileStore::open(path).unwrap();
        assert_eq!(store.get("users_data").unwrap(), Some(b"[3]".to_vec()));
        assert_eq!(store.get("keys_data").unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_compact_keeps_live_records_only() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bureau.db");

        let store = FileStore::open(path.clone()).unwrap();
        for i in 0..10u8 {
            store.set("keys_data", &[i]).unwrap();
        }
        store.set("current_user", b"{}").unwrap();
        store.delete("current_user").unwrap();

        assert_eq!(store.compact().unwrap(), 1);

        let log = std::fs::read_to_string(&path).unwrap();
        assert_eq!(log.lines().count(), 1);

        // Writes after compaction still persist
        store.set("users_data", b"[]").unwrap();
        drop(store);

        let reopened = FileStore::open(path).unwrap();
        assert_eq!(reopened.get("keys_data").unwrap(), Some(vec![9]));
        assert_eq!(reopened.get("users_data").unwrap(), Some(b"[]".to_vec()));
    }

    #[test]
    fn test_rejects_reserved_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path().join("bureau.db")).unwrap();

        let err = store.set("bad|key", b"x").unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_missing_key_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bureau.db");
        let store = FileStore::open(path.clone()).unwrap();

        store.delete("current_user").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
