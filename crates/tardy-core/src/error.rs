/// Low-level storage errors (RocksDB, serialization, in-memory lock failures).
/// Storage operations can only fail with infrastructure errors; callers treat
/// every variant as transient.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("rocksdb error: {0}")]
    RocksDb(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt data: {0}")]
    CorruptData(String),

    #[error("storage lock poisoned")]
    LockPoisoned,
}

impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::RocksDb(err.into_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Errors returned by queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The message could not be serialized for storage.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// A stored payload no longer decodes as the queue's message type. The
    /// delivery is still recorded, so the envelope redelivers after its ack
    /// deadline like any other unacknowledged message.
    #[error("failed to decode message {id}: {reason}")]
    Decode { id: uuid::Uuid, reason: String },

    /// The storage already holds another queue's envelopes.
    #[error("storage is owned by queue {owner}")]
    StorageOwned { owner: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors surfaced by a worker poll cycle. None of them are fatal to the
/// poll loop; the next tick simply tries again.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(String),

    #[error("execution pool is shut down")]
    PoolClosed,

    #[error("failed to spawn thread: {0}")]
    Spawn(String),

    #[error("thread panicked during shutdown")]
    ThreadPanicked,

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("error reading {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("error parsing {path}: {reason}")]
    Parse { path: String, reason: String },
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
pub type QueueResult<T> = std::result::Result<T, QueueError>;
pub type WorkerResult<T> = std::result::Result<T, WorkerError>;
