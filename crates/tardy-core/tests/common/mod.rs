#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tardy_core::{
    Delivery, ManualClock, MemoryStorage, Message, Queue, QueueSettings, RocksDbStorage, Storage,
};

pub const ACK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    StartExecution { id: u32 },
    ResumeStage { id: u32, stage: String },
    CancelExecution { id: u32 },
}

impl Message for Job {
    fn kind(&self) -> &'static str {
        match self {
            Job::StartExecution { .. } => "start_execution",
            Job::ResumeStage { .. } => "resume_stage",
            Job::CancelExecution { .. } => "cancel_execution",
        }
    }
}

pub fn settings() -> QueueSettings {
    QueueSettings {
        name: "contract".to_string(),
        ack_timeout_ms: ACK_TIMEOUT.as_millis() as u64,
    }
}

/// A queue plus the clock and storage behind it. The temp dir (RocksDB only)
/// lives as long as the fixture.
pub struct Fixture {
    pub queue: Queue<Job>,
    pub clock: Arc<ManualClock>,
    pub storage: Arc<dyn Storage>,
    pub dir: Option<tempfile::TempDir>,
}

impl Fixture {
    pub fn memory() -> Self {
        Self::build(Arc::new(MemoryStorage::new()), None)
    }

    pub fn rocksdb() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(RocksDbStorage::open(dir.path()).unwrap());
        Self::build(storage, Some(dir))
    }

    fn build(storage: Arc<dyn Storage>, dir: Option<tempfile::TempDir>) -> Self {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000_000_000));
        let queue = Queue::open(storage.clone(), clock.clone(), &settings()).unwrap();
        Self {
            queue,
            clock,
            storage,
            dir,
        }
    }

    pub fn expect_delivery(&self) -> Delivery<Job> {
        self.queue
            .poll()
            .unwrap()
            .expect("expected a due message")
    }
}

pub fn start(id: u32) -> Job {
    Job::StartExecution { id }
}
