//! Parameter schemas and boundary validation.
//!
//! Parameters travel as a loosely typed `string -> string` map. They are checked
//! against the descriptor's schema once, at the dispatcher boundary, and only
//! then converted into typed [`Arguments`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FieldViolation, ViolationReason};

/// Declared type of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    /// Parses a raw wire value. Returns `None` when it does not match this type.
    #[must_use]
    pub fn parse(self, raw: &str) -> Option<ArgValue> {
        let trimmed = raw.trim();
        match self {
            Self::String => Some(ArgValue::String(raw.to_string())),
            Self::Integer => trimmed.parse().ok().map(ArgValue::Integer),
            Self::Number => trimmed
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(ArgValue::Number),
            Self::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" => Some(ArgValue::Boolean(true)),
                "false" => Some(ArgValue::Boolean(false)),
                _ => None,
            },
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of an operation's ordered parameter schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name as exposed on the wire and in discovery documents.
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Whether the parameter must be present and non-empty.
    pub required: bool,
    pub description: String,
}

impl ParameterSpec {
    pub fn required(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            description: description.into(),
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            description: description.into(),
        }
    }
}

/// A validated, typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
}

impl ArgValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

/// Typed parameters keyed by their schema name.
///
/// Only parameters declared in the schema appear here; undeclared wire keys
/// are dropped during validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Arguments {
    values: BTreeMap<String, ArgValue>,
}

impl Arguments {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    /// Convenience accessor for string parameters.
    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ArgValue::as_str)
    }

    #[must_use]
    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ArgValue::as_i64)
    }

    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(ArgValue::as_bool)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Finds a raw parameter by name, ignoring ASCII case.
///
/// An exact match wins over a case-folded one.
#[must_use]
pub fn lookup<'a>(raw: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    raw.get(name)
        .or_else(|| {
            raw.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
        .map(String::as_str)
}

/// Validates raw wire parameters against an ordered schema.
///
/// Wire keys match schema names case-insensitively. Violations are reported
/// in schema order so error details are deterministic.
///
/// # Errors
///
/// Returns every [`FieldViolation`] found: required parameters that are
/// missing or blank, and present parameters that do not parse as their type.
pub fn validate(
    schema: &[ParameterSpec],
    raw: &HashMap<String, String>,
) -> Result<Arguments, Vec<FieldViolation>> {
    let mut values = BTreeMap::new();
    let mut violations = Vec::new();

    for spec in schema {
        let found = lookup(raw, &spec.name);

        let Some(value) = found else {
            if spec.required {
                violations.push(violation(spec, ViolationReason::Missing));
            }
            continue;
        };

        if value.trim().is_empty() {
            if spec.required {
                violations.push(violation(spec, ViolationReason::Empty));
            }
            continue;
        }

        match spec.param_type.parse(value) {
            Some(parsed) => {
                values.insert(spec.name.clone(), parsed);
            }
            None => violations.push(violation(spec, ViolationReason::InvalidType)),
        }
    }

    if violations.is_empty() {
        Ok(Arguments { values })
    } else {
        Err(violations)
    }
}

fn violation(spec: &ParameterSpec, reason: ViolationReason) -> FieldViolation {
    FieldViolation {
        field: spec.name.clone(),
        reason,
    }
}
