//! AKS cluster operations.

use std::sync::Arc;

use async_trait::async_trait;
use day2_core::{
    Arguments, DescriptorError, ExecutionContext, OperationDescriptor, OperationHandler,
    OperationResult, ParamType, ParameterSpec,
};
use serde_json::json;
use tracing::info;

use super::backend::{PowerState, ResourceBackend};
use super::{resource_id, RESOURCE_ID};

pub const OPERATOR: &str = "AKS-Operator";
pub const READER: &str = "AKS-Reader";
const TAG: &str = "AKS";

/// Moves a cluster to `target`. Already being there is not an error.
struct SetClusterPower {
    backend: Arc<dyn ResourceBackend>,
    target: PowerState,
}

#[async_trait]
impl OperationHandler for SetClusterPower {
    async fn execute(&self, _ctx: &ExecutionContext, args: &Arguments) -> OperationResult {
        let id = resource_id(args)?;
        let current = self.backend.cluster(&id).await?;
        if current.power_state == self.target {
            return Ok(json!({
                "cluster": current,
                "changed": false,
            }));
        }

        let updated = self.backend.set_cluster_power(&id, self.target).await?;
        info!(cluster = %id, power = ?self.target, "cluster power state changed");
        Ok(json!({
            "cluster": updated,
            "changed": true,
        }))
    }
}

struct ClusterStatus {
    backend: Arc<dyn ResourceBackend>,
}

#[async_trait]
impl OperationHandler for ClusterStatus {
    async fn execute(&self, _ctx: &ExecutionContext, args: &Arguments) -> OperationResult {
        let id = resource_id(args)?;
        let cluster = self.backend.cluster(&id).await?;
        Ok(json!({ "cluster": cluster }))
    }
}

fn resource_param() -> ParameterSpec {
    ParameterSpec::required(
        RESOURCE_ID,
        ParamType::String,
        "Cluster as <resourceGroup>/<cluster>",
    )
}

/// Descriptors for every AKS operation.
///
/// # Errors
///
/// Returns an error if a descriptor fails to build.
pub fn descriptors(
    backend: &Arc<dyn ResourceBackend>,
) -> Result<Vec<OperationDescriptor>, DescriptorError> {
    let power = |name: &str, summary: &str, target| {
        OperationDescriptor::builder(name, OPERATOR)
            .summary(summary)
            .tag(TAG)
            .parameter(resource_param())
            .standard_responses()
            .handler(SetClusterPower {
                backend: Arc::clone(backend),
                target,
            })
            .build()
    };

    Ok(vec![
        power("StartCluster", "Start an AKS cluster", PowerState::Running)?,
        power("StopCluster", "Stop an AKS cluster", PowerState::Stopped)?,
        OperationDescriptor::builder("GetClusterStatus", READER)
            .summary("Get AKS cluster status")
            .tag(TAG)
            .parameter(resource_param())
            .standard_responses()
            .handler(ClusterStatus {
                backend: Arc::clone(backend),
            })
            .build()?,
    ])
}
