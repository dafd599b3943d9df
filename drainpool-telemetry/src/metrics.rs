use std::sync::{Mutex, PoisonError};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tracing::debug;

pub use metrics_exporter_prometheus::PrometheusHandle;

// The Prometheus recorder is process-global and can only be installed once, while callers
// (tests in particular) may ask for it many times. Installation is fallible, so the handle is
// cached behind a mutex rather than a `OnceLock`.
static PROMETHEUS_HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// Installs the Prometheus recorder on first use and returns a handle for rendering.
///
/// No HTTP listener is started; callers render the handle wherever they expose metrics and
/// are responsible for calling [`PrometheusHandle::run_upkeep`] if they keep it for long.
pub fn init_metrics_handle() -> Result<PrometheusHandle, BuildError> {
    let mut cached = PROMETHEUS_HANDLE
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if let Some(handle) = cached.as_ref() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    debug!("prometheus recorder installed");

    *cached = Some(handle.clone());

    Ok(handle)
}
