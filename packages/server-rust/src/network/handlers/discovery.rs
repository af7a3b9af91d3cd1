//! Discovery and scrape endpoints.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use utoipa::openapi::OpenApi;

use super::AppState;
use crate::service::OperationSummary;

/// `GET /openapi.json`. Rebuilt per request so late registrations show up.
pub async fn openapi_handler(State(state): State<AppState>) -> Json<OpenApi> {
    Json(state.exporter.export())
}

/// `GET /operations`: compact listing in registration order.
pub async fn operations_handler(State(state): State<AppState>) -> Json<Vec<OperationSummary>> {
    Json(state.exporter.catalog())
}

/// `GET /metrics`: Prometheus text, or 404 when no recorder is installed.
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
