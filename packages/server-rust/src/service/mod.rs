//! Operation dispatch core.
//!
//! 1. **Registry** (`registry`): name -> descriptor, copy-on-write
//! 2. **Gate** (`gate`): capability check against caller claims
//! 3. **Middleware** (`middleware`): Tower layers (audit, throttle, metrics, execute)
//! 4. **Dispatcher** (`dispatcher`): resolve, authorize, validate, then run the chain
//! 5. **Exporter** (`exporter`): `OpenAPI` discovery document
//! 6. **Domain** (`domain`): demo AKS and PostgreSQL catalog
//! 7. **Background workers** (`worker`): periodic maintenance

pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod exporter;
pub mod gate;
pub mod middleware;
pub mod operation;
pub mod registry;
pub mod worker;

// Re-export key types for convenient access.
pub use config::{ServerConfig, ThrottleConfig};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use exporter::{MetadataExporter, OperationSummary};
pub use gate::{AuthDecision, AuthorizationGate};
pub use operation::{DispatchStage, Invocation};
pub use registry::{OperationKey, OperationRegistry, RegistryError};
pub use worker::{BackgroundRunnable, BackgroundWorker, SweepTask, ThrottleSweeper};
