use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use super::*;
use crate::envelope::Envelope;
use crate::error::{StorageError, StorageResult};

pub(super) const ACK_TIMEOUT: Duration = Duration::from_secs(30);
pub(super) const START_NS: u64 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum Job {
    Start { id: u32 },
    Cancel { id: u32 },
}

impl Message for Job {
    fn kind(&self) -> &'static str {
        match self {
            Job::Start { .. } => "start",
            Job::Cancel { .. } => "cancel",
        }
    }
}

pub(super) fn settings() -> QueueSettings {
    QueueSettings {
        name: "jobs".to_string(),
        ack_timeout_ms: ACK_TIMEOUT.as_millis() as u64,
    }
}

pub(super) struct Fixture {
    pub(super) queue: Queue<Job>,
    pub(super) clock: Arc<ManualClock>,
    pub(super) storage: Arc<FlakyStorage>,
}

impl Fixture {
    /// Encoded keys of every stored envelope, in delivery order.
    pub(super) fn stored_keys(&self) -> Vec<Vec<u8>> {
        self.storage
            .list_envelopes()
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect()
    }

    /// Overwrite the envelope stored under `key` with bytes that do not decode.
    pub(super) fn corrupt(&self, key: &[u8]) {
        self.storage
            .write_batch(vec![WriteBatchOp::PutEnvelope {
                key: key.to_vec(),
                value: b"not json".to_vec(),
            }])
            .unwrap();
    }
}

pub(super) fn fixture() -> Fixture {
    fixture_with_storage(Arc::new(FlakyStorage::default()))
}

pub(super) fn fixture_with_storage(storage: Arc<FlakyStorage>) -> Fixture {
    let clock = Arc::new(ManualClock::new(START_NS));
    let queue = Queue::open(storage.clone(), clock.clone(), &settings()).unwrap();
    Fixture {
        queue,
        clock,
        storage,
    }
}

pub(super) fn fixture_with_metrics(harness: &MetricTestHarness) -> Fixture {
    let storage = Arc::new(FlakyStorage::default());
    let clock = Arc::new(ManualClock::new(START_NS));
    let queue = Queue::open_with_metrics(
        storage.clone(),
        clock.clone(),
        &settings(),
        harness.queue_metrics(),
    )
    .unwrap();
    Fixture {
        queue,
        clock,
        storage,
    }
}

/// Poll and unwrap a delivery that must be present.
pub(super) fn expect_delivery(queue: &Queue<Job>) -> Delivery<Job> {
    queue
        .poll()
        .unwrap()
        .expect("expected a due message")
}

/// Memory storage whose writes can be made to fail on demand.
#[derive(Debug, Default)]
pub(super) struct FlakyStorage {
    inner: MemoryStorage,
    fail_writes: AtomicBool,
}

impl FlakyStorage {
    pub(super) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StorageError::RocksDb("injected write failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Storage for FlakyStorage {
    fn put_envelope(&self, key: &[u8], envelope: &Envelope) -> StorageResult<()> {
        self.check()?;
        self.inner.put_envelope(key, envelope)
    }

    fn get_envelope(&self, key: &[u8]) -> StorageResult<Option<Envelope>> {
        self.inner.get_envelope(key)
    }

    fn delete_envelope(&self, key: &[u8]) -> StorageResult<()> {
        self.check()?;
        self.inner.delete_envelope(key)
    }

    fn list_envelopes(&self) -> StorageResult<Vec<(Vec<u8>, StorageResult<Envelope>)>> {
        self.inner.list_envelopes()
    }

    fn put_state(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.check()?;
        self.inner.put_state(key, value)
    }

    fn get_state(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get_state(key)
    }

    fn write_batch(&self, ops: Vec<WriteBatchOp>) -> StorageResult<()> {
        self.check()?;
        self.inner.write_batch(ops)
    }

    fn flush(&self) -> StorageResult<()> {
        self.inner.flush()
    }
}
