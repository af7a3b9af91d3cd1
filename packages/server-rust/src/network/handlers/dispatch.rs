//! `POST /operations/{name}`: the HTTP face of the dispatcher.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use day2_core::{lookup, ErrorKind, ExecutionContext, OperationError, OperationOutcome};
use serde_json::{Map, Value};
use tracing::debug;

use super::AppState;
use crate::network::auth::Authenticated;
use crate::service::domain::RESOURCE_ID;

/// Header naming the target resource. Falls back to the `ResourceId`
/// parameter, matched case-insensitively like every parameter name.
pub const TARGET_RESOURCE_HEADER: &str = "x-target-resource";

/// HTTP status for a dispatch result.
#[must_use]
pub const fn status_for(kind: Option<ErrorKind>) -> StatusCode {
    match kind {
        None => StatusCode::OK,
        Some(ErrorKind::NotFound) => StatusCode::NOT_FOUND,
        Some(ErrorKind::Unauthorized) => StatusCode::UNAUTHORIZED,
        Some(ErrorKind::ValidationFailure) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(ErrorKind::Throttled) => StatusCode::TOO_MANY_REQUESTS,
        Some(ErrorKind::ExecutionFailure) => StatusCode::INTERNAL_SERVER_ERROR,
        Some(ErrorKind::Cancelled) => StatusCode::REQUEST_TIMEOUT,
    }
}

/// Authenticates the caller, converts the body to raw parameters, and
/// dispatches. Every response body is an [`OperationOutcome`].
pub async fn dispatch_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.shutdown.is_accepting() {
        return failure(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Cancelled,
            "server is not accepting operations".to_string(),
        );
    }
    let _in_flight = state.shutdown.in_flight_guard();

    let Authenticated {
        claims,
        credentials,
    } = match state.auth.authenticate(&headers) {
        Ok(caller) => caller,
        Err(err) => {
            debug!(operation = %name, error = %err, "authentication failed");
            return failure(StatusCode::UNAUTHORIZED, ErrorKind::Unauthorized, err.to_string());
        }
    };

    let parameters = match parameters_from_body(&body) {
        Ok(parameters) => parameters,
        Err(detail) => {
            return failure(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::ValidationFailure,
                detail.to_string(),
            );
        }
    };

    let target = headers
        .get(TARGET_RESOURCE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| lookup(&parameters, RESOURCE_ID).map(str::to_string))
        .unwrap_or_default();

    let ctx = ExecutionContext::new(claims.subject_id.clone(), target)
        .with_parameters(parameters)
        .with_credentials(credentials)
        .with_cancellation(state.shutdown.dispatch_token());

    let result = state.dispatcher.execute(&name, ctx, &claims).await;
    let retry_after = match &result {
        Err(OperationError::Throttled { retry_after_ms, .. }) => {
            Some(retry_after_ms.div_ceil(1_000).max(1))
        }
        _ => None,
    };
    let status = status_for(result.as_ref().err().map(OperationError::kind));

    let mut response = (status, Json(OperationOutcome::from(result))).into_response();
    if let Some(secs) = retry_after {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

/// Flattens a JSON object body into raw string parameters.
///
/// An empty body means no parameters. Strings are taken as-is, `null` is
/// treated as absent, and every other value is kept as its JSON text.
fn parameters_from_body(body: &[u8]) -> Result<HashMap<String, String>, &'static str> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(HashMap::new());
    }
    let object: Map<String, Value> =
        serde_json::from_slice(body).map_err(|_| "request body must be a JSON object")?;

    Ok(object
        .into_iter()
        .filter_map(|(name, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((name, s)),
            other => Some((name, other.to_string())),
        })
        .collect())
}

fn failure(status: StatusCode, error_kind: ErrorKind, detail: String) -> Response {
    let outcome = OperationOutcome::Failure {
        error_kind,
        detail,
        fields: Vec::new(),
    };
    (status, Json(outcome)).into_response()
}
