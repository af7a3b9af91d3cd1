//! Azure Database for PostgreSQL flexible server operations.

use std::sync::Arc;

use async_trait::async_trait;
use day2_core::{
    Arguments, DescriptorError, ExecutionContext, OperationDescriptor, OperationError,
    OperationHandler, OperationResult, ParamType, ParameterSpec,
};
use serde_json::json;
use tracing::info;

use super::backend::{PowerState, ResourceBackend};
use super::{resource_id, RESOURCE_ID};

pub const OPERATOR: &str = "PSSQL-Operator";
pub const READER: &str = "PSSQL-Reader";
const TAG: &str = "PostgreSQL";

const TARGET_VERSION: &str = "TargetVersion";
const DATABASE_NAME: &str = "DatabaseName";
const SCRIPT_NAME: &str = "ScriptName";
const RESOURCE_GROUP: &str = "ResourceGroup";

/// Which server action a [`ServerOperation`] performs.
#[derive(Debug, Clone, Copy)]
enum ServerAction {
    Start,
    Stop,
    Status,
    Upgrade,
    RunScript,
    List,
}

struct ServerOperation {
    backend: Arc<dyn ResourceBackend>,
    action: ServerAction,
}

#[async_trait]
impl OperationHandler for ServerOperation {
    async fn execute(&self, _ctx: &ExecutionContext, args: &Arguments) -> OperationResult {
        match self.action {
            ServerAction::Start => self.set_power(args, PowerState::Running).await,
            ServerAction::Stop => self.set_power(args, PowerState::Stopped).await,
            ServerAction::Status => {
                let server = self.backend.server(&resource_id(args)?).await?;
                Ok(json!({ "server": server }))
            }
            ServerAction::Upgrade => self.upgrade(args).await,
            ServerAction::RunScript => {
                let id = resource_id(args)?;
                let database = args.str(DATABASE_NAME).unwrap_or_default();
                let script = args.str(SCRIPT_NAME).unwrap_or_default();
                let run = self.backend.run_script(&id, database, script).await?;
                info!(server = %id, database, script, "script executed");
                Ok(json!({ "run": run }))
            }
            ServerAction::List => {
                let group = args.str(RESOURCE_GROUP).filter(|g| !g.trim().is_empty());
                let servers = self.backend.list_servers(group).await;
                Ok(json!({
                    "resourceGroup": group,
                    "count": servers.len(),
                    "servers": servers,
                }))
            }
        }
    }
}

impl ServerOperation {
    async fn set_power(&self, args: &Arguments, target: PowerState) -> OperationResult {
        let id = resource_id(args)?;
        let current = self.backend.server(&id).await?;
        if current.power_state == target {
            return Ok(json!({ "server": current, "changed": false }));
        }
        let updated = self.backend.set_server_power(&id, target).await?;
        info!(server = %id, power = ?target, "server power state changed");
        Ok(json!({ "server": updated, "changed": true }))
    }

    async fn upgrade(&self, args: &Arguments) -> OperationResult {
        let id = resource_id(args)?;
        let target = args
            .i64(TARGET_VERSION)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| OperationError::execution("TargetVersion must be a positive integer"))?;
        let before = self.backend.server(&id).await?.version;
        let upgraded = self.backend.upgrade_server(&id, target).await?;
        info!(server = %id, from = before, to = target, "server upgraded");
        Ok(json!({
            "server": upgraded,
            "previousVersion": before,
        }))
    }
}

fn server_param() -> ParameterSpec {
    ParameterSpec::required(
        RESOURCE_ID,
        ParamType::String,
        "Server as <resourceGroup>/<server>",
    )
}

/// Descriptors for every PostgreSQL operation.
///
/// # Errors
///
/// Returns an error if a descriptor fails to build.
pub fn descriptors(
    backend: &Arc<dyn ResourceBackend>,
) -> Result<Vec<OperationDescriptor>, DescriptorError> {
    let op = |name: &str, capability: &str, summary: &str, action| {
        OperationDescriptor::builder(name, capability)
            .summary(summary)
            .tag(TAG)
            .standard_responses()
            .handler(ServerOperation {
                backend: Arc::clone(backend),
                action,
            })
    };

    Ok(vec![
        op("StartServer", OPERATOR, "Start a PostgreSQL server", ServerAction::Start)
            .parameter(server_param())
            .build()?,
        op("StopServer", OPERATOR, "Stop a PostgreSQL server", ServerAction::Stop)
            .parameter(server_param())
            .build()?,
        op(
            "GetServerStatus",
            READER,
            "Get PostgreSQL server status",
            ServerAction::Status,
        )
        .parameter(server_param())
        .build()?,
        op(
            "MajorUpgrade",
            OPERATOR,
            "Upgrade a PostgreSQL server to a new major version",
            ServerAction::Upgrade,
        )
        .parameter(server_param())
        .parameter(ParameterSpec::required(
            TARGET_VERSION,
            ParamType::Integer,
            "Major version to upgrade to, e.g. 16",
        ))
        .build()?,
        op(
            "ExecuteScript",
            OPERATOR,
            "Run a stored SQL script against a database",
            ServerAction::RunScript,
        )
        .parameter(server_param())
        .parameter(ParameterSpec::required(
            DATABASE_NAME,
            ParamType::String,
            "Database to run the script in",
        ))
        .parameter(ParameterSpec::required(
            SCRIPT_NAME,
            ParamType::String,
            "Name of a stored SQL script",
        ))
        .build()?,
        op(
            "ListServers",
            READER,
            "List PostgreSQL servers",
            ServerAction::List,
        )
        .parameter(ParameterSpec::optional(
            RESOURCE_GROUP,
            ParamType::String,
            "Only list servers in this resource group",
        ))
        .build()?,
    ])
}
