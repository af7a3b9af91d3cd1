//! Network module with deferred startup lifecycle.
//!
//! `new()` wires shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until shutdown. The split lets the binary
//! start background workers against the same dispatcher between `start()`
//! and `serve()`.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::auth::JwtAuthenticator;
use super::config::{AuthConfig, NetworkConfig, TlsConfig};
use super::handlers::{
    dispatch_handler, health_handler, liveness_handler, metrics_handler, openapi_handler,
    operations_handler, readiness_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::service::{Dispatcher, MetadataExporter};

/// Final wait for handlers still finishing after cancellation.
const ABORT_GRACE: Duration = Duration::from_secs(1);

/// Manages the HTTP server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    dispatcher: Arc<Dispatcher>,
    exporter: Arc<MetadataExporter>,
    auth: Arc<JwtAuthenticator>,
    shutdown: Arc<ShutdownController>,
    metrics: Option<PrometheusHandle>,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, auth: &AuthConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let exporter = Arc::new(MetadataExporter::new(Arc::clone(dispatcher.registry())));
        Self {
            config,
            listener: None,
            dispatcher,
            exporter,
            auth: Arc::new(JwtAuthenticator::new(auth)),
            shutdown: Arc::new(ShutdownController::new()),
            metrics: None,
        }
    }

    /// Serves `GET /metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    #[must_use]
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `POST /operations/{name}` -- dispatch
    /// - `GET /operations` -- compact catalog
    /// - `GET /openapi.json` -- discovery document
    /// - `GET /metrics` -- Prometheus text
    /// - `GET /health`, `/health/live`, `/health/ready`
    pub fn build_router(&self) -> Router {
        let state = AppState {
            dispatcher: Arc::clone(&self.dispatcher),
            exporter: Arc::clone(&self.exporter),
            auth: Arc::clone(&self.auth),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            start_time: Instant::now(),
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/operations", get(operations_handler))
            .route("/operations/{name}", post(dispatch_handler))
            .route("/openapi.json", get(openapi_handler))
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the bound port, which differs from the configured one when
    /// port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until `shutdown` resolves, then drains.
    ///
    /// On the signal the server stops admitting dispatches (503) and waits up
    /// to `drain_timeout` for in-flight ones. Dispatches still running after
    /// that are cancelled and finish as `Cancelled`.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called, TLS material cannot be
    /// loaded, or the server hits a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();
        let ctrl = Arc::clone(&self.shutdown);
        let signal = drain_on(shutdown, Arc::clone(&ctrl), self.config.drain_timeout);

        ctrl.set_ready();

        if let Some(tls_config) = &self.config.tls {
            serve_tls(listener, router, tls_config, signal).await?;
        } else {
            serve_plain(listener, router, signal).await?;
        }

        if !ctrl.wait_for_drain(ABORT_GRACE).await {
            warn!(
                in_flight = ctrl.in_flight_count(),
                "server stopped with dispatches still in flight"
            );
        }
        info!("server stopped");
        Ok(())
    }
}

/// Resolves once `signal` fires, after switching to draining and arming the
/// drain deadline.
async fn drain_on(
    signal: impl Future<Output = ()> + Send + 'static,
    ctrl: Arc<ShutdownController>,
    drain_timeout: Duration,
) {
    signal.await;
    info!(in_flight = ctrl.in_flight_count(), "shutdown signal received, draining");
    ctrl.trigger_shutdown();

    tokio::spawn(async move {
        if ctrl.wait_for_drain(drain_timeout).await {
            info!("all dispatches drained");
        } else {
            warn!(
                in_flight = ctrl.in_flight_count(),
                "drain timeout expired, cancelling in-flight dispatches"
            );
            ctrl.abort_in_flight();
        }
    });
}

async fn serve_plain(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!("Serving plain HTTP connections");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Serves TLS connections using `axum-server` with rustls.
///
/// Reuses the pre-bound TCP listener by converting it to a `std::net::TcpListener`.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls_config: &TlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls_config.cert_path, &tls_config.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(None);
    });

    info!("Serving TLS connections on {}", addr);

    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}
