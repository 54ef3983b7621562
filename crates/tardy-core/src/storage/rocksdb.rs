use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, FlushOptions, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use crate::envelope::Envelope;
use crate::error::{StorageError, StorageResult};
use crate::storage::traits::{Storage, WriteBatchOp};

const CF_ENVELOPES: &str = "envelopes";
const CF_STATE: &str = "state";

/// All column family names (excluding `default` which RocksDB creates automatically).
const COLUMN_FAMILIES: &[&str] = &[CF_ENVELOPES, CF_STATE];

type DB = DBWithThreadMode<MultiThreaded>;

/// RocksDB-backed storage implementation.
pub struct RocksDbStorage {
    db: DB,
}

impl RocksDbStorage {
    /// Open or create a RocksDB database at the given path with all column families.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;
        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> StorageResult<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::RocksDb(format!("column family not found: {name}")))
    }
}

impl Storage for RocksDbStorage {
    fn put_envelope(&self, key: &[u8], envelope: &Envelope) -> StorageResult<()> {
        let cf = self.cf(CF_ENVELOPES)?;
        let value = serde_json::to_vec(envelope)?;
        self.db.put_cf(&cf, key, &value)?;
        Ok(())
    }

    fn get_envelope(&self, key: &[u8]) -> StorageResult<Option<Envelope>> {
        let cf = self.cf(CF_ENVELOPES)?;
        match self.db.get_cf(&cf, key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn delete_envelope(&self, key: &[u8]) -> StorageResult<()> {
        let cf = self.cf(CF_ENVELOPES)?;
        self.db.delete_cf(&cf, key)?;
        Ok(())
    }

    fn list_envelopes(&self) -> StorageResult<Vec<(Vec<u8>, StorageResult<Envelope>)>> {
        let cf = self.cf(CF_ENVELOPES)?;
        let mut results = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item?;
            let envelope = serde_json::from_slice::<Envelope>(&value).map_err(StorageError::from);
            results.push((key.to_vec(), envelope));
        }
        Ok(results)
    }

    fn put_state(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let cf = self.cf(CF_STATE)?;
        self.db.put_cf(&cf, key.as_bytes(), value)?;
        Ok(())
    }

    fn get_state(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let cf = self.cf(CF_STATE)?;
        Ok(self.db.get_cf(&cf, key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn write_batch(&self, ops: Vec<WriteBatchOp>) -> StorageResult<()> {
        let envelopes = self.cf(CF_ENVELOPES)?;
        let state = self.cf(CF_STATE)?;
        let mut batch = WriteBatch::default();

        for op in ops {
            match op {
                WriteBatchOp::PutEnvelope { key, value } => batch.put_cf(&envelopes, &key, &value),
                WriteBatchOp::DeleteEnvelope { key } => batch.delete_cf(&envelopes, &key),
                WriteBatchOp::PutState { key, value } => {
                    batch.put_cf(&state, key.as_bytes(), &value)
                }
            }
        }

        self.db.write(batch)?;
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        self.db.flush_wal(true)?;
        let mut opts = FlushOptions::default();
        opts.set_wait(true);
        for name in COLUMN_FAMILIES {
            let cf = self.cf(name)?;
            self.db.flush_cf_opt(&cf, &opts)?;
        }
        Ok(())
    }
}
