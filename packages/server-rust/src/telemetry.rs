//! Logging and metrics recorder setup for the server binary.

use std::sync::{Once, OnceLock};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::service::middleware::describe_metrics;

static LOGGING: Once = Once::new();
static PROMETHEUS: OnceLock<PrometheusHandle> = OnceLock::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human-readable lines.
    #[default]
    Text,
}

/// Installs the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Later calls are
/// no-ops.
pub fn init_logging(format: LogFormat) {
    LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(filter);
        // A subscriber set elsewhere (tests, embedding app) wins.
        let _ = match format {
            LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
            LogFormat::Text => registry.with(fmt::layer()).try_init(),
        };
    });
}

/// Installs the Prometheus recorder and describes the dispatch metrics.
///
/// Returns the same handle on every call after the first success.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn install_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(PROMETHEUS.get_or_init(|| handle).clone())
}
