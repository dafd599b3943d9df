use std::sync::Once;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable that turns on log output in tests.
const ENABLE_TEST_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

/// Errors returned while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] TryInitError),
}

/// Keeps the non-blocking log writer alive; buffered lines are flushed when dropped.
#[must_use = "dropping the flusher stops log output"]
#[derive(Debug)]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Installs a global subscriber writing formatted events to stdout.
///
/// The filter is taken from `RUST_LOG`, defaulting to `info` for the binary named
/// `app_name` and for the `drainpool` library.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{}=info,drainpool=info", app_name.replace('-', "_")))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer))
        .try_init()?;

    Ok(LogFlusher { _guard: guard })
}

/// Installs a test subscriber once per process when `ENABLE_TRACING` is set.
///
/// Output goes through the libtest capture so it only shows for failing tests.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        if std::env::var(ENABLE_TEST_TRACING_ENV_NAME).is_err() {
            return;
        }

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("drainpool=debug"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
