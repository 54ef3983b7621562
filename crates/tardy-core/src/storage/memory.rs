use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::envelope::Envelope;
use crate::error::{StorageError, StorageResult};
use crate::storage::traits::{Storage, WriteBatchOp};

#[derive(Debug, Default)]
struct Tables {
    /// Encoded envelope key -> JSON envelope, kept in key order like the
    /// RocksDB column family.
    envelopes: BTreeMap<Vec<u8>, Vec<u8>>,
    state: HashMap<String, Vec<u8>>,
}

/// Volatile storage backed by ordered maps.
///
/// Intended for tests, development and queues whose contents may be lost on
/// restart. Values go through the same JSON codec as the durable backend so
/// both behave identically apart from persistence.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn put_envelope(&self, key: &[u8], envelope: &Envelope) -> StorageResult<()> {
        let value = serde_json::to_vec(envelope)?;
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        tables.envelopes.insert(key.to_vec(), value);
        Ok(())
    }

    fn get_envelope(&self, key: &[u8]) -> StorageResult<Option<Envelope>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        match tables.envelopes.get(key) {
            Some(value) => Ok(Some(serde_json::from_slice(value)?)),
            None => Ok(None),
        }
    }

    fn delete_envelope(&self, key: &[u8]) -> StorageResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        tables.envelopes.remove(key);
        Ok(())
    }

    fn list_envelopes(&self) -> StorageResult<Vec<(Vec<u8>, StorageResult<Envelope>)>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tables
            .envelopes
            .iter()
            .map(|(key, value)| {
                let envelope =
                    serde_json::from_slice::<Envelope>(value).map_err(StorageError::from);
                (key.clone(), envelope)
            })
            .collect())
    }

    fn put_state(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        tables.state.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get_state(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tables.state.get(key).cloned())
    }

    fn write_batch(&self, ops: Vec<WriteBatchOp>) -> StorageResult<()> {
        // Holding the write lock for the whole batch makes it atomic for readers.
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        for op in ops {
            match op {
                WriteBatchOp::PutEnvelope { key, value } => {
                    tables.envelopes.insert(key, value);
                }
                WriteBatchOp::DeleteEnvelope { key } => {
                    tables.envelopes.remove(&key);
                }
                WriteBatchOp::PutState { key, value } => {
                    tables.state.insert(key, value);
                }
            }
        }
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}
