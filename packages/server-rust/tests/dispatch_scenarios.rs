//! Dispatch behavior observed from outside the crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use day2_core::{
    handler_fn, CallerClaims, ErrorKind, ExecutionContext, OperationDescriptor, OperationError,
    OperationOutcome, ParamType, ParameterSpec,
};
use day2_server::service::middleware::{AuditPhase, AuditStatus, MemoryAuditSink};
use day2_server::service::{Dispatcher, OperationRegistry};
use serde_json::json;

struct Harness {
    dispatcher: Dispatcher,
    audit: Arc<MemoryAuditSink>,
    invocations: Arc<AtomicUsize>,
}

/// Registry holding one `StartCluster` spy that counts its invocations.
fn harness() -> Harness {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invocations);
    let descriptor = OperationDescriptor::builder("StartCluster", "AKS-Operator")
        .summary("Start an AKS cluster")
        .tag("AKS")
        .parameter(ParameterSpec::required(
            "ResourceId",
            ParamType::String,
            "Cluster as <resourceGroup>/<cluster>",
        ))
        .standard_responses()
        .handler(handler_fn(move |ctx: ExecutionContext, _args| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(json!({ "started": ctx.target_resource_id })) }
        }))
        .build()
        .unwrap();

    let registry = Arc::new(OperationRegistry::new());
    registry.register(descriptor).unwrap();

    let audit = Arc::new(MemoryAuditSink::new());
    let dispatcher = Dispatcher::builder(registry)
        .audit_sink(Arc::clone(&audit) as _)
        .build()
        .unwrap();

    Harness {
        dispatcher,
        audit,
        invocations,
    }
}

fn cluster_ctx() -> ExecutionContext {
    ExecutionContext::new("alice", "rg1/cluster1").with_parameter("ResourceId", "rg1/cluster1")
}

#[tokio::test]
async fn start_cluster_end_to_end() {
    let h = harness();
    let operator = CallerClaims::new("alice", ["AKS-Operator"]);
    let viewer = CallerClaims::new("bob", ["Viewer"]);

    let ok = h
        .dispatcher
        .execute("StartCluster", cluster_ctx(), &operator)
        .await;
    assert_eq!(ok, Ok(json!({ "started": "rg1/cluster1" })));

    let denied = h
        .dispatcher
        .execute("StartCluster", cluster_ctx(), &viewer)
        .await;
    assert_eq!(
        OperationOutcome::from(denied).error_kind(),
        Some(ErrorKind::Unauthorized)
    );

    let invalid = h
        .dispatcher
        .execute(
            "StartCluster",
            ExecutionContext::new("alice", "rg1/cluster1"),
            &operator,
        )
        .await;
    let err = invalid.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
    assert_eq!(err.fields(), vec!["ResourceId".to_string()]);

    // Only the admitted call reached the body and the audit stage.
    assert_eq!(h.invocations.load(Ordering::SeqCst), 1);
    let records = h.audit.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].phase, AuditPhase::Started);
    assert!(matches!(
        records[1].phase,
        AuditPhase::Completed {
            status: AuditStatus::Success,
            ..
        }
    ));
    assert_eq!(records[0].invocation_id, records[1].invocation_id);
    assert_eq!(records[1].caller_id, "alice");
    assert_eq!(records[1].target_resource_id, "rg1/cluster1");
}

#[tokio::test]
async fn unregistered_name_reaches_no_decorator() {
    let h = harness();
    let claims = CallerClaims::new("alice", ["AKS-Operator"]);

    let result = h
        .dispatcher
        .execute("DeleteCluster", cluster_ctx(), &claims)
        .await;

    assert_eq!(
        result,
        Err(OperationError::NotFound {
            name: "DeleteCluster".to_string()
        })
    );
    assert_eq!(h.invocations.load(Ordering::SeqCst), 0);
    assert!(h.audit.is_empty());
}

#[tokio::test]
async fn unauthorized_caller_is_never_audited() {
    let h = harness();
    let claims = CallerClaims::new("bob", ["AKS-Reader", "Viewer"]);

    for _ in 0..5 {
        let result = h
            .dispatcher
            .execute("StartCluster", cluster_ctx(), &claims)
            .await;
        assert_eq!(
            result,
            Err(OperationError::Unauthorized {
                capability: "AKS-Operator".to_string()
            })
        );
    }

    assert_eq!(h.invocations.load(Ordering::SeqCst), 0);
    assert!(h.audit.is_empty());
}

#[tokio::test]
async fn capability_match_ignores_case() {
    let h = harness();
    let claims = CallerClaims::new("alice", ["aks-operator"]);

    let result = h
        .dispatcher
        .execute("startcluster", cluster_ctx(), &claims)
        .await;

    assert!(result.is_ok());
    assert_eq!(h.audit.len(), 2);
}
