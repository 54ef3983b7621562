use crate::envelope::Envelope;
use crate::error::StorageResult;

/// Represents a single operation in an atomic write batch.
#[derive(Debug)]
pub enum WriteBatchOp {
    PutEnvelope { key: Vec<u8>, value: Vec<u8> },
    DeleteEnvelope { key: Vec<u8> },
    PutState { key: String, value: Vec<u8> },
}

/// Storage trait for all persistence operations. Implementations must be
/// thread-safe; the queue serializes its own calls but readers such as
/// tests and recovery may call in concurrently.
///
/// A storage instance belongs to exactly one queue. Envelope keys carry no
/// queue name, so the owning queue's name is recorded in the `owner` state
/// key and opening a queue with a different name fails. Share one queue
/// across threads by cloning its handle rather than opening it twice.
pub trait Storage: Send + Sync {
    // --- Envelope operations ---

    /// Store an envelope under its encoded key.
    fn put_envelope(&self, key: &[u8], envelope: &Envelope) -> StorageResult<()>;

    /// Retrieve an envelope by its encoded key.
    fn get_envelope(&self, key: &[u8]) -> StorageResult<Option<Envelope>>;

    /// Delete an envelope by its encoded key. Missing keys are not an error.
    fn delete_envelope(&self, key: &[u8]) -> StorageResult<()>;

    /// List all envelopes in key (delivery) order. Each value is decoded on
    /// its own, so one corrupt entry does not hide the rest.
    fn list_envelopes(&self) -> StorageResult<Vec<(Vec<u8>, StorageResult<Envelope>)>>;

    // --- State operations ---

    fn put_state(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    fn get_state(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    // --- Batch operations ---

    /// Atomically apply a batch of write operations.
    fn write_batch(&self, ops: Vec<WriteBatchOp>) -> StorageResult<()>;

    /// Make all prior writes durable. A no-op for volatile backends.
    fn flush(&self) -> StorageResult<()>;
}
