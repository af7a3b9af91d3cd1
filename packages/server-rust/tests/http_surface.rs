//! The axum router end to end, driven with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use axum::Router;
use day2_server::network::{AuthConfig, JwtAuthenticator, NetworkConfig, NetworkModule};
use day2_server::service::domain::{register_catalog, InMemoryBackend};
use day2_server::service::{Dispatcher, OperationRegistry};
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "http-surface-secret";

fn router() -> Router {
    let registry = Arc::new(OperationRegistry::new());
    register_catalog(&registry, Arc::new(InMemoryBackend::demo())).unwrap();
    let dispatcher = Arc::new(Dispatcher::builder(registry).build().unwrap());
    let module = NetworkModule::new(NetworkConfig::default(), &AuthConfig::new(SECRET), dispatcher);
    module.shutdown_controller().set_ready();
    module.build_router()
}

fn token(roles: &[&str]) -> String {
    JwtAuthenticator::new(&AuthConfig::new(SECRET))
        .issue("alice", roles, 300)
        .unwrap()
}

fn post(path: &str, roles: Option<&[&str]>, body: Value) -> Request<Body> {
    let body = body.to_string();
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(CONTENT_TYPE, "application/json")
        .header(CONTENT_LENGTH, body.len());
    if let Some(roles) = roles {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token(roles)));
    }
    builder.body(Body::from(body)).unwrap()
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn success_is_200_with_output() {
    let (status, body) = send(
        router(),
        post(
            "/operations/GetServerStatus",
            Some(&["PSSQL-Reader"]),
            json!({ "ResourceId": "rg1/pg-orders" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Success");
    assert_eq!(body["output"]["server"]["version"], 14);
}

#[tokio::test]
async fn numeric_parameters_are_accepted_as_json_numbers() {
    let (status, body) = send(
        router(),
        post(
            "/operations/MajorUpgrade",
            Some(&["PSSQL-Operator"]),
            json!({ "ResourceId": "rg2/pg-billing", "TargetVersion": 15 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "Success");
}

#[tokio::test]
async fn wrong_parameter_type_is_422() {
    let (status, body) = send(
        router(),
        post(
            "/operations/MajorUpgrade",
            Some(&["PSSQL-Operator"]),
            json!({ "ResourceId": "rg2/pg-billing", "TargetVersion": "fifteen" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errorKind"], "ValidationFailure");
    assert_eq!(body["fields"], json!(["TargetVersion"]));
}

#[tokio::test]
async fn failures_map_to_status_codes() {
    let cases: Vec<(&str, Option<&[&str]>, Value, StatusCode, &str)> = vec![
        (
            "/operations/NoSuchOperation",
            Some(&["AKS-Operator"][..]),
            json!({}),
            StatusCode::NOT_FOUND,
            "NotFound",
        ),
        (
            "/operations/StartCluster",
            Some(&["Viewer"][..]),
            json!({ "ResourceId": "rg1/cluster1" }),
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
        ),
        (
            "/operations/StartCluster",
            None,
            json!({ "ResourceId": "rg1/cluster1" }),
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
        ),
        (
            "/operations/StartCluster",
            Some(&["AKS-Operator"][..]),
            json!({}),
            StatusCode::UNPROCESSABLE_ENTITY,
            "ValidationFailure",
        ),
        (
            "/operations/ExecuteScript",
            Some(&["PSSQL-Operator"][..]),
            json!({
                "ResourceId": "rg1/pg-orders",
                "DatabaseName": "orders",
                "ScriptName": "drop_everything.sql"
            }),
            StatusCode::INTERNAL_SERVER_ERROR,
            "ExecutionFailure",
        ),
    ];

    for (path, roles, body, expected_status, expected_kind) in cases {
        let (status, envelope) = send(router(), post(path, roles, body)).await;
        assert_eq!(status, expected_status, "{path}: {envelope}");
        assert_eq!(envelope["status"], "Failure");
        assert_eq!(envelope["errorKind"], expected_kind, "{path}");
    }
}

#[tokio::test]
async fn discovery_document_lists_operations() {
    let request = Request::builder()
        .uri("/openapi.json")
        .body(Body::empty())
        .unwrap();
    let (status, doc) = send(router(), request).await;

    assert_eq!(status, StatusCode::OK);
    let start = &doc["paths"]["/operations/StartCluster"]["post"];
    assert_eq!(start["operationId"], "StartCluster");
    assert_eq!(start["x-required-capability"], "AKS-Operator");
    assert_eq!(
        start["requestBody"]["content"]["application/json"]["schema"]["required"],
        json!(["ResourceId"])
    );
}

#[tokio::test]
async fn operations_listing_is_public() {
    let request = Request::builder()
        .uri("/operations")
        .body(Body::empty())
        .unwrap();
    let (status, listing) = send(router(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing.as_array().map(Vec::len), Some(9));
    assert_eq!(listing[0]["name"], "StartCluster");
    assert_eq!(listing[0]["requiredCapability"], "AKS-Operator");
    assert_eq!(listing[0]["parameters"], json!(["ResourceId"]));
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let big = "x".repeat(NetworkConfig::default().max_body_bytes + 1);
    let (status, _) = send(
        router(),
        post(
            "/operations/StartCluster",
            Some(&["AKS-Operator"]),
            json!({ "ResourceId": big }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn health_reports_catalog_size() {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, health) = send(router(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["state"], "ready");
    assert_eq!(health["operations"], 9);
}
