//! HTTP handler definitions for the Day2 server.
//!
//! Defines `AppState` (the shared state carried through axum extractors) and
//! re-exports every handler for the router.

pub mod discovery;
pub mod dispatch;
pub mod health;

pub use discovery::{metrics_handler, openapi_handler, operations_handler};
pub use dispatch::{dispatch_handler, status_for, TARGET_RESOURCE_HEADER};
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusHandle;

use super::auth::JwtAuthenticator;
use super::{NetworkConfig, ShutdownController};
use crate::service::{Dispatcher, MetadataExporter};

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub exporter: Arc<MetadataExporter>,
    pub auth: Arc<JwtAuthenticator>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
    /// Present when the Prometheus recorder was installed.
    pub metrics: Option<PrometheusHandle>,
}
