//! Discovery document generation.
//!
//! Builds an `OpenAPI` 3.1 document from the registry at call time. One
//! `POST /operations/{name}` path is emitted per registered operation, with
//! its parameter schema as a JSON object request body.

use std::sync::Arc;

use day2_core::{OperationDescriptor, ParamType};
use serde::Serialize;
use utoipa::openapi::extensions::ExtensionsBuilder;
use utoipa::openapi::path::{HttpMethod, OperationBuilder};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::schema::{ObjectBuilder, Schema, Type};
use utoipa::openapi::{
    ContentBuilder, InfoBuilder, OpenApi, OpenApiBuilder, PathItem, PathsBuilder, RefOr, Required,
    ResponseBuilder,
};

use crate::service::registry::OperationRegistry;

/// Vendor extension carrying the operation's required capability.
pub const CAPABILITY_EXTENSION: &str = "x-required-capability";

/// Path under which operation `name` is exposed.
#[must_use]
pub fn operation_path(name: &str) -> String {
    format!("/operations/{name}")
}

/// Compact catalog entry served by `GET /operations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSummary {
    pub name: String,
    pub required_capability: String,
    pub summary: String,
    pub parameters: Vec<String>,
}

/// Renders registry contents as discovery metadata.
pub struct MetadataExporter {
    registry: Arc<OperationRegistry>,
    title: String,
    version: String,
}

impl MetadataExporter {
    #[must_use]
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self {
            registry,
            title: "Day2 Operations".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Builds the document. Output depends only on registry contents.
    #[must_use]
    pub fn export(&self) -> OpenApi {
        let mut paths = PathsBuilder::new();
        for descriptor in self.registry.list_all() {
            paths = paths.path(
                operation_path(descriptor.name()),
                PathItem::new(HttpMethod::Post, build_operation(&descriptor)),
            );
        }

        OpenApiBuilder::new()
            .info(
                InfoBuilder::new()
                    .title(self.title.clone())
                    .version(self.version.clone())
                    .description(Some("Governed day-2 operations"))
                    .build(),
            )
            .paths(paths.build())
            .build()
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.export())
    }

    /// One summary per operation, in registration order.
    #[must_use]
    pub fn catalog(&self) -> Vec<OperationSummary> {
        self.registry
            .list_all()
            .iter()
            .map(|d| OperationSummary {
                name: d.name().to_string(),
                required_capability: d.required_capability().to_string(),
                summary: d.summary().to_string(),
                parameters: d.parameters().iter().map(|p| p.name.clone()).collect(),
            })
            .collect()
    }
}

fn build_operation(descriptor: &OperationDescriptor) -> utoipa::openapi::path::Operation {
    let mut op = OperationBuilder::new()
        .operation_id(Some(descriptor.name()))
        .summary(Some(descriptor.summary()))
        .description(Some(format!(
            "Requires capability `{}`.",
            descriptor.required_capability()
        )))
        .extensions(Some(
            ExtensionsBuilder::new()
                .add(CAPABILITY_EXTENSION, descriptor.required_capability())
                .build(),
        ));

    for tag in descriptor.tags() {
        op = op.tag(tag.clone());
    }

    if !descriptor.parameters().is_empty() {
        let body = RequestBodyBuilder::new()
            .content(
                "application/json",
                ContentBuilder::new()
                    .schema(Some(RefOr::T(parameter_schema(descriptor))))
                    .build(),
            )
            .required(Some(Required::True))
            .build();
        op = op.request_body(Some(body));
    }

    for (status, description) in descriptor.responses() {
        op = op.response(
            status.to_string(),
            ResponseBuilder::new().description(description.clone()).build(),
        );
    }

    op.build()
}

fn parameter_schema(descriptor: &OperationDescriptor) -> Schema {
    let mut object = ObjectBuilder::new().schema_type(Type::Object);
    for spec in descriptor.parameters() {
        let property = ObjectBuilder::new()
            .schema_type(schema_type(spec.param_type))
            .description(Some(spec.description.clone()))
            .build();
        object = object.property(spec.name.clone(), RefOr::T(Schema::Object(property)));
        if spec.required {
            object = object.required(spec.name.clone());
        }
    }
    Schema::Object(object.build())
}

fn schema_type(param_type: ParamType) -> Type {
    match param_type {
        ParamType::String => Type::String,
        ParamType::Integer => Type::Integer,
        ParamType::Number => Type::Number,
        ParamType::Boolean => Type::Boolean,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
