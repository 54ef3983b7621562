pub mod clock;
pub mod config;
pub mod envelope;
pub mod error;
pub mod message;
pub mod metrics;
pub mod queue;
pub mod runtime;
pub mod storage;
pub mod telemetry;
pub mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    load_config, QueueSettings, RedeliveryConfig, StorageBackend, StorageConfig, TardyConfig,
    WorkerConfig,
};
pub use envelope::AckToken;
pub use error::{
    ConfigError, QueueError, QueueResult, StorageError, StorageResult, WorkerError, WorkerResult,
};
pub use message::Message;
pub use queue::{Ack, Delivery, Queue, QueueStats};
pub use runtime::WorkerRuntime;
pub use storage::{MemoryStorage, RocksDbStorage, Storage};
pub use worker::{HandlerRegistry, MessageHandler, PollOutcome, Worker};
