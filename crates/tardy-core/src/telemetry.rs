use tracing_subscriber::util::TryInitError;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info";

/// Initialize the tracing subscriber for structured logging.
///
/// - Debug builds: human-readable output with targets
/// - Release builds: JSON output for log aggregation
///
/// The level comes from `RUST_LOG`, defaulting to `info`. Panics if a
/// global subscriber is already installed; see [`try_init_tracing`].
pub fn init_tracing() {
    if let Err(e) = try_init_tracing() {
        panic!("failed to install tracing subscriber: {e}");
    }
}

/// Like [`init_tracing`], but returns an error instead of panicking when a
/// subscriber is already set. Tests call this from every case.
pub fn try_init_tracing() -> Result<(), TryInitError> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    if cfg!(debug_assertions) {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    }
}
