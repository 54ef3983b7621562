use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;

/// Environment variable that overrides `storage.data_dir`.
pub const DATA_DIR_ENV: &str = "TARDY_DATA_DIR";

/// Top-level configuration, deserializable from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TardyConfig {
    pub queue: QueueSettings,
    pub worker: WorkerConfig,
    pub redelivery: RedeliveryConfig,
    pub storage: StorageConfig,
}

/// Queue settings applied uniformly to every delivery.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Label used in logs and metrics.
    pub name: String,
    /// Visibility timeout: how long a delivered message may stay
    /// unacknowledged before a redelivery check hands it out again.
    pub ack_timeout_ms: u64,
}

/// Poll loop and execution pool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    /// Number of handler threads.
    pub pool_size: usize,
    /// Jobs that may wait for a free handler thread before `submit` blocks
    /// the poll loop.
    pub pool_queue_capacity: usize,
    /// Whether the worker polls as soon as it is built, without waiting for
    /// an external readiness signal.
    pub start_active: bool,
}

/// Cadence of the redelivery scan.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedeliveryConfig {
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    RocksDb,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: String,
}

impl QueueSettings {
    /// Default visibility timeout: one minute.
    pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 60_000;
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            ack_timeout_ms: Self::DEFAULT_ACK_TIMEOUT_MS,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            pool_size: 4,
            pool_queue_capacity: 64,
            start_active: false,
        }
    }
}

impl Default for RedeliveryConfig {
    fn default() -> Self {
        Self { interval_ms: 1_000 }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::RocksDb,
            data_dir: "data".to_string(),
        }
    }
}

/// Load configuration from the first path that exists, falling back to
/// defaults when none does. `TARDY_DATA_DIR` overrides the data directory
/// either way.
pub fn load_config<P: AsRef<Path>>(paths: &[P]) -> Result<TardyConfig, ConfigError> {
    let mut config = None;

    for path in paths {
        let path = path.as_ref();
        if !path.exists() {
            continue;
        }
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: display.clone(),
            reason: e.to_string(),
        })?;
        let parsed: TardyConfig = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: display.clone(),
            reason: e.to_string(),
        })?;
        info!(path = %display, "loaded configuration");
        config = Some(parsed);
        break;
    }

    let mut config = config.unwrap_or_else(|| {
        info!("no config file found, using defaults");
        TardyConfig::default()
    });

    if let Ok(data_dir) = std::env::var(DATA_DIR_ENV) {
        config.storage.data_dir = data_dir;
    }

    Ok(config)
}
