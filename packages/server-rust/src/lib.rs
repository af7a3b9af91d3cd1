//! Day2 Server: governed dispatch of day-2 operations.
//!
//! [`service`] holds the dispatch core (registry, authorization gate,
//! decorator chain, exporter) and the demo catalog; [`network`] puts it
//! behind an axum HTTP surface.

pub mod network;
pub mod service;
pub mod telemetry;

pub use service::{Dispatcher, MetadataExporter, OperationRegistry};
