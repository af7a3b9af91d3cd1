//! Operation descriptors: immutable metadata plus the executable contract.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::schema::ParameterSpec;
use crate::traits::OperationHandler;

/// Errors raised while assembling a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("operation name must not be empty")]
    EmptyName,
    #[error("operation {name} must declare a required capability")]
    EmptyCapability { name: String },
    #[error("operation {name} declares parameter {parameter} more than once")]
    DuplicateParameter { name: String, parameter: String },
    #[error("operation {name} has no handler")]
    MissingHandler { name: String },
}

/// Static metadata and executable contract for one governed action.
///
/// Immutable after construction. The registry owns descriptors behind `Arc`
/// so dispatches can hold one without copying.
pub struct OperationDescriptor {
    name: String,
    required_capability: String,
    summary: String,
    tags: Vec<String>,
    parameters: Vec<ParameterSpec>,
    responses: BTreeMap<u16, String>,
    handler: Arc<dyn OperationHandler>,
}

impl OperationDescriptor {
    /// Starts a builder for an operation guarded by `required_capability`.
    pub fn builder(
        name: impl Into<String>,
        required_capability: impl Into<String>,
    ) -> OperationDescriptorBuilder {
        OperationDescriptorBuilder {
            name: name.into(),
            required_capability: required_capability.into(),
            summary: String::new(),
            tags: Vec::new(),
            parameters: Vec::new(),
            responses: BTreeMap::new(),
            handler: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn required_capability(&self) -> &str {
        &self.required_capability
    }

    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Parameter schema in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// Declared status code → description contract.
    #[must_use]
    pub fn responses(&self) -> &BTreeMap<u16, String> {
        &self.responses
    }

    #[must_use]
    pub fn handler(&self) -> Arc<dyn OperationHandler> {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("name", &self.name)
            .field("required_capability", &self.required_capability)
            .field("parameters", &self.parameters)
            .field("responses", &self.responses)
            .finish_non_exhaustive()
    }
}

/// Builder for [`OperationDescriptor`].
pub struct OperationDescriptorBuilder {
    name: String,
    required_capability: String,
    summary: String,
    tags: Vec<String>,
    parameters: Vec<ParameterSpec>,
    responses: BTreeMap<u16, String>,
    handler: Option<Arc<dyn OperationHandler>>,
}

impl OperationDescriptorBuilder {
    #[must_use]
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Appends a parameter; schema order is declaration order.
    #[must_use]
    pub fn parameter(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    #[must_use]
    pub fn response(mut self, status: u16, description: impl Into<String>) -> Self {
        self.responses.insert(status, description.into());
        self
    }

    /// Declares the response contract every dispatched operation can produce.
    #[must_use]
    pub fn standard_responses(self) -> Self {
        self.response(200, "Operation succeeded")
            .response(401, "Caller lacks the required capability")
            .response(404, "Operation not found")
            .response(408, "Operation was cancelled or timed out")
            .response(422, "Parameters failed validation")
            .response(429, "Rate limit exceeded")
            .response(500, "Operation failed during execution")
    }

    #[must_use]
    pub fn handler<H: OperationHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Finalizes the descriptor.
    ///
    /// # Errors
    ///
    /// Returns a [`DescriptorError`] if the name or capability is blank, a
    /// parameter name repeats (case-insensitively), or no handler was set.
    pub fn build(self) -> Result<OperationDescriptor, DescriptorError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(DescriptorError::EmptyName);
        }
        let required_capability = self.required_capability.trim().to_string();
        if required_capability.is_empty() {
            return Err(DescriptorError::EmptyCapability { name });
        }

        let mut seen = HashSet::new();
        for spec in &self.parameters {
            if !seen.insert(spec.name.to_ascii_lowercase()) {
                return Err(DescriptorError::DuplicateParameter {
                    name,
                    parameter: spec.name.clone(),
                });
            }
        }

        let Some(handler) = self.handler else {
            return Err(DescriptorError::MissingHandler { name });
        };

        Ok(OperationDescriptor {
            name,
            required_capability,
            summary: self.summary,
            tags: self.tags,
            parameters: self.parameters,
            responses: self.responses,
            handler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::schema::{Arguments, ParamType};
    use crate::traits::handler_fn;

    fn noop() -> impl OperationHandler {
        handler_fn(|_ctx: ExecutionContext, _args: Arguments| async move {
            Ok(serde_json::Value::Null)
        })
    }

    #[test]
    fn builds_descriptor_with_ordered_schema() {
        let descriptor = OperationDescriptor::builder("StartCluster", "AKS-Operator")
            .summary("Start an AKS cluster")
            .parameter(ParameterSpec::required("ResourceId", ParamType::String, "cluster id"))
            .parameter(ParameterSpec::optional("Wait", ParamType::Boolean, "block until running"))
            .standard_responses()
            .handler(noop())
            .build()
            .unwrap();

        assert_eq!(descriptor.name(), "StartCluster");
        assert_eq!(descriptor.required_capability(), "AKS-Operator");
        let names: Vec<_> = descriptor.parameters().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["ResourceId", "Wait"]);
        assert_eq!(descriptor.responses().len(), 7);
        assert_eq!(descriptor.responses()[&429], "Rate limit exceeded");
    }

    #[test]
    fn rejects_blank_capability() {
        let err = OperationDescriptor::builder("StartCluster", "  ")
            .handler(noop())
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::EmptyCapability { .. }));
    }

    #[test]
    fn rejects_blank_name() {
        let err = OperationDescriptor::builder("", "AKS-Operator")
            .handler(noop())
            .build()
            .unwrap_err();
        assert_eq!(err, DescriptorError::EmptyName);
    }

    #[test]
    fn rejects_duplicate_parameter_names() {
        let err = OperationDescriptor::builder("StartCluster", "AKS-Operator")
            .parameter(ParameterSpec::required("ResourceId", ParamType::String, ""))
            .parameter(ParameterSpec::optional("resourceid", ParamType::String, ""))
            .handler(noop())
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            DescriptorError::DuplicateParameter { parameter, .. } if parameter == "resourceid"
        ));
    }

    #[test]
    fn rejects_missing_handler() {
        let err = OperationDescriptor::builder("StartCluster", "AKS-Operator")
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::MissingHandler { .. }));
    }
}
