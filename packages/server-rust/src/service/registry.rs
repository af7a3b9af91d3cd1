use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use day2_core::{DescriptorError, OperationDescriptor};
use parking_lot::Mutex;
use tracing::debug;

// ---------------------------------------------------------------------------
// OperationKey
// ---------------------------------------------------------------------------

/// Case-folded lookup key for an operation name.
///
/// Folds ASCII only, matching role and parameter-name comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey(String);

impl OperationKey {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_ascii_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("operation already registered: {name}")]
    DuplicateOperation { name: String },
    #[error("operation not found: {name}")]
    NotFound { name: String },
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(#[from] DescriptorError),
}

// ---------------------------------------------------------------------------
// OperationRegistry
// ---------------------------------------------------------------------------

/// Immutable view of the registry at one point in time.
#[derive(Default)]
struct Snapshot {
    /// Registration order, used for discovery listings.
    ordered: Vec<Arc<OperationDescriptor>>,
    /// Case-folded name -> index into `ordered`.
    index: HashMap<OperationKey, usize>,
}

/// Holds every registered operation descriptor.
///
/// Reads (`resolve`, `list_all`) load a copy-on-write snapshot and never
/// block. Registration serializes on a writer mutex, clones the snapshot,
/// and swaps the new one in, so it is safe to register while dispatches are
/// in flight.
pub struct OperationRegistry {
    snapshot: ArcSwap<Snapshot>,
    write_lock: Mutex<()>,
}

impl OperationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// Register a descriptor. Names are unique case-insensitively; the first
    /// registration of a name always wins.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateOperation` if the name is taken.
    pub fn register(
        &self,
        descriptor: OperationDescriptor,
    ) -> Result<Arc<OperationDescriptor>, RegistryError> {
        let key = OperationKey::new(descriptor.name());
        let _guard = self.write_lock.lock();

        let current = self.snapshot.load_full();
        if current.index.contains_key(&key) {
            return Err(RegistryError::DuplicateOperation {
                name: descriptor.name().to_string(),
            });
        }

        let descriptor = Arc::new(descriptor);
        let mut ordered = current.ordered.clone();
        let mut index = current.index.clone();
        index.insert(key, ordered.len());
        ordered.push(Arc::clone(&descriptor));
        self.snapshot.store(Arc::new(Snapshot { ordered, index }));

        debug!(
            operation = descriptor.name(),
            capability = descriptor.required_capability(),
            "operation registered"
        );
        Ok(descriptor)
    }

    /// Register several descriptors, stopping at the first failure.
    ///
    /// Descriptors registered before the failure stay registered.
    ///
    /// # Errors
    ///
    /// Returns the first `RegistryError` encountered.
    pub fn register_all<I>(&self, descriptors: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = OperationDescriptor>,
    {
        for descriptor in descriptors {
            self.register(descriptor)?;
        }
        Ok(())
    }

    /// Case-insensitive lookup.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if no operation has that name.
    pub fn resolve(&self, name: &str) -> Result<Arc<OperationDescriptor>, RegistryError> {
        let snapshot = self.snapshot.load();
        snapshot
            .index
            .get(&OperationKey::new(name))
            .map(|&i| Arc::clone(&snapshot.ordered[i]))
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    /// All descriptors in registration order.
    #[must_use]
    pub fn list_all(&self) -> Vec<Arc<OperationDescriptor>> {
        self.snapshot.load().ordered.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.load().ordered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
