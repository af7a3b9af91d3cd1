//! Demo operation catalog.
//!
//! AKS and PostgreSQL day-2 operations whose bodies delegate to a
//! [`ResourceBackend`]. Registered by the server binary and by the
//! end-to-end tests.

pub mod aks;
pub mod backend;
pub mod postgres;

use std::sync::Arc;

use day2_core::{Arguments, OperationDescriptor, OperationError};

pub use backend::{InMemoryBackend, ResourceBackend, ResourceId};

use crate::service::registry::{OperationRegistry, RegistryError};

/// Parameter naming the target cluster or server.
pub const RESOURCE_ID: &str = "ResourceId";

/// Every catalog descriptor, AKS first.
///
/// # Errors
///
/// Returns an error if a descriptor fails to build.
pub fn catalog(backend: Arc<dyn ResourceBackend>) -> Result<Vec<OperationDescriptor>, RegistryError> {
    let mut descriptors = aks::descriptors(&backend)?;
    descriptors.extend(postgres::descriptors(&backend)?);
    Ok(descriptors)
}

/// Registers the whole catalog. Returns the number of operations registered.
///
/// # Errors
///
/// Returns an error on a name collision with an existing registration.
pub fn register_catalog(
    registry: &OperationRegistry,
    backend: Arc<dyn ResourceBackend>,
) -> Result<usize, RegistryError> {
    let descriptors = catalog(backend)?;
    let count = descriptors.len();
    registry.register_all(descriptors)?;
    Ok(count)
}

pub(crate) fn resource_id(args: &Arguments) -> Result<ResourceId, OperationError> {
    Ok(args.str(RESOURCE_ID).unwrap_or_default().parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_full_catalog() {
        let registry = OperationRegistry::new();
        let count = register_catalog(&registry, Arc::new(InMemoryBackend::demo())).unwrap();
        assert_eq!(count, 9);

        let names: Vec<_> = registry
            .list_all()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "StartCluster",
                "StopCluster",
                "GetClusterStatus",
                "StartServer",
                "StopServer",
                "GetServerStatus",
                "MajorUpgrade",
                "ExecuteScript",
                "ListServers",
            ]
        );
    }

    #[test]
    fn registering_twice_collides() {
        let registry = OperationRegistry::new();
        let backend: Arc<dyn ResourceBackend> = Arc::new(InMemoryBackend::new());
        register_catalog(&registry, Arc::clone(&backend)).unwrap();
        assert!(matches!(
            register_catalog(&registry, backend),
            Err(RegistryError::DuplicateOperation { .. })
        ));
    }

    #[test]
    fn every_operation_declares_capability_and_tag() {
        for descriptor in catalog(Arc::new(InMemoryBackend::new())).unwrap() {
            assert!(descriptor.required_capability().starts_with("AKS-")
                || descriptor.required_capability().starts_with("PSSQL-"));
            assert_eq!(descriptor.tags().len(), 1);
        }
    }
}
