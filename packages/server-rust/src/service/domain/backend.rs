//! Resource backend used by the demo catalog.
//!
//! Operation bodies talk to cloud resources only through [`ResourceBackend`].
//! [`InMemoryBackend`] simulates power state and server versions so the
//! catalog can run without any cloud credentials.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use dashmap::DashMap;
use day2_core::OperationError;
use serde::Serialize;

// ---------------------------------------------------------------------------
// ResourceId
// ---------------------------------------------------------------------------

/// `<resourceGroup>/<name>` identifier of a cluster or server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub resource_group: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_group, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BackendError::InvalidResourceId {
            value: s.to_string(),
        };
        let (group, name) = s.trim().split_once('/').ok_or_else(invalid)?;
        if group.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }
        Ok(Self::new(group, name))
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PowerState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterState {
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub kubernetes_version: String,
    pub power_state: PowerState,
    pub provisioning_state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerState {
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub version: u32,
    pub power_state: PowerState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRun {
    pub server: String,
    pub database_name: String,
    pub script_name: String,
    pub statements: usize,
}

// ---------------------------------------------------------------------------
// BackendError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("invalid resource id {value:?}, expected <resourceGroup>/<name>")]
    InvalidResourceId { value: String },
    #[error("resource not found: {resource}")]
    ResourceNotFound { resource: String },
    #[error("script not found: {script}")]
    ScriptNotFound { script: String },
    #[error("{0}")]
    Conflict(String),
}

impl From<BackendError> for OperationError {
    fn from(err: BackendError) -> Self {
        OperationError::execution(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// ResourceBackend
// ---------------------------------------------------------------------------

/// Downstream actions the demo operations delegate to.
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    async fn cluster(&self, id: &ResourceId) -> Result<ClusterState, BackendError>;

    async fn set_cluster_power(
        &self,
        id: &ResourceId,
        power: PowerState,
    ) -> Result<ClusterState, BackendError>;

    async fn server(&self, id: &ResourceId) -> Result<ServerState, BackendError>;

    async fn set_server_power(
        &self,
        id: &ResourceId,
        power: PowerState,
    ) -> Result<ServerState, BackendError>;

    /// Upgrades to `target_version`. Fails if the server is not below it.
    async fn upgrade_server(
        &self,
        id: &ResourceId,
        target_version: u32,
    ) -> Result<ServerState, BackendError>;

    async fn run_script(
        &self,
        id: &ResourceId,
        database_name: &str,
        script_name: &str,
    ) -> Result<ScriptRun, BackendError>;

    /// All servers, or only those in `resource_group`, sorted by id.
    async fn list_servers(&self, resource_group: Option<&str>) -> Vec<ServerState>;
}

// ---------------------------------------------------------------------------
// InMemoryBackend
// ---------------------------------------------------------------------------

/// Simulated resources keyed by [`ResourceId`].
#[derive(Default)]
pub struct InMemoryBackend {
    clusters: DashMap<ResourceId, ClusterState>,
    servers: DashMap<ResourceId, ServerState>,
    /// Script name -> statement count.
    scripts: DashMap<String, usize>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend seeded with a few resources, used by the server binary.
    #[must_use]
    pub fn demo() -> Self {
        Self::new()
            .with_cluster(ResourceId::new("rg1", "cluster1"), "westeurope", "1.29.2")
            .with_cluster(ResourceId::new("rg1", "cluster2"), "westeurope", "1.28.5")
            .with_server(ResourceId::new("rg1", "pg-orders"), "westeurope", 14)
            .with_server(ResourceId::new("rg2", "pg-billing"), "northeurope", 13)
            .with_script("vacuum_analyze.sql", 1)
            .with_script("reindex_all.sql", 3)
    }

    #[must_use]
    pub fn with_cluster(self, id: ResourceId, location: &str, kubernetes_version: &str) -> Self {
        let state = ClusterState {
            name: id.name.clone(),
            resource_group: id.resource_group.clone(),
            location: location.to_string(),
            kubernetes_version: kubernetes_version.to_string(),
            power_state: PowerState::Running,
            provisioning_state: "Succeeded".to_string(),
        };
        self.clusters.insert(id, state);
        self
    }

    #[must_use]
    pub fn with_server(self, id: ResourceId, location: &str, version: u32) -> Self {
        let state = ServerState {
            name: id.name.clone(),
            resource_group: id.resource_group.clone(),
            location: location.to_string(),
            version,
            power_state: PowerState::Running,
        };
        self.servers.insert(id, state);
        self
    }

    #[must_use]
    pub fn with_script(self, name: &str, statements: usize) -> Self {
        self.scripts.insert(name.to_string(), statements);
        self
    }

    fn not_found(id: &ResourceId) -> BackendError {
        BackendError::ResourceNotFound {
            resource: id.to_string(),
        }
    }
}

#[async_trait]
impl ResourceBackend for InMemoryBackend {
    async fn cluster(&self, id: &ResourceId) -> Result<ClusterState, BackendError> {
        self.clusters
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Self::not_found(id))
    }

    async fn set_cluster_power(
        &self,
        id: &ResourceId,
        power: PowerState,
    ) -> Result<ClusterState, BackendError> {
        let mut entry = self.clusters.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        entry.power_state = power;
        Ok(entry.clone())
    }

    async fn server(&self, id: &ResourceId) -> Result<ServerState, BackendError> {
        self.servers
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Self::not_found(id))
    }

    async fn set_server_power(
        &self,
        id: &ResourceId,
        power: PowerState,
    ) -> Result<ServerState, BackendError> {
        let mut entry = self.servers.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        entry.power_state = power;
        Ok(entry.clone())
    }

    async fn upgrade_server(
        &self,
        id: &ResourceId,
        target_version: u32,
    ) -> Result<ServerState, BackendError> {
        let mut entry = self.servers.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        if entry.version == target_version {
            return Err(BackendError::Conflict(format!(
                "server {id} is already on version {target_version}"
            )));
        }
        if entry.version > target_version {
            return Err(BackendError::Conflict(format!(
                "cannot downgrade server {id} from {} to {target_version}",
                entry.version
            )));
        }
        entry.version = target_version;
        Ok(entry.clone())
    }

    async fn run_script(
        &self,
        id: &ResourceId,
        database_name: &str,
        script_name: &str,
    ) -> Result<ScriptRun, BackendError> {
        let server = self.server(id).await?;
        if server.power_state != PowerState::Running {
            return Err(BackendError::Conflict(format!("server {id} is stopped")));
        }
        let statements = self
            .scripts
            .get(script_name)
            .map(|entry| *entry.value())
            .ok_or_else(|| BackendError::ScriptNotFound {
                script: script_name.to_string(),
            })?;
        Ok(ScriptRun {
            server: id.to_string(),
            database_name: database_name.to_string(),
            script_name: script_name.to_string(),
            statements,
        })
    }

    async fn list_servers(&self, resource_group: Option<&str>) -> Vec<ServerState> {
        let mut servers: Vec<(ResourceId, ServerState)> = self
            .servers
            .iter()
            .filter(|entry| {
                resource_group.map_or(true, |rg| entry.key().resource_group.eq_ignore_ascii_case(rg))
            })
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        servers.sort_by(|a, b| a.0.cmp(&b.0));
        servers.into_iter().map(|(_, state)| state).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
