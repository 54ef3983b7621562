pub(crate) mod keys;
mod memory;
mod rocksdb;
mod traits;

use std::sync::Arc;

use tracing::info;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::StorageResult;

pub use self::memory::MemoryStorage;
pub use self::rocksdb::RocksDbStorage;
pub use traits::{Storage, WriteBatchOp};

/// Open the backend selected by `config`.
pub fn open(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    match config.backend {
        StorageBackend::Memory => {
            info!("using in-memory storage");
            Ok(Arc::new(MemoryStorage::new()))
        }
        StorageBackend::RocksDb => {
            info!(data_dir = %config.data_dir, "opening rocksdb storage");
            Ok(Arc::new(RocksDbStorage::open(&config.data_dir)?))
        }
    }
}
