//! Declarative argument schemas and their validator
//!
//! A tool's JSON schema is compiled once at registration into a [`ToolSchema`].
//! At call time [`ToolSchema::validate`] either hands back typed [`Arguments`]
//! or a [`SchemaViolation`] describing the first offending field. Handlers only
//! ever see arguments that went through this step.

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::registry::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Null,
}

impl PrimitiveType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Null => "null",
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Null => value.is_null(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema must be a JSON object")]
    NotAnObject,
    #[error("schema must describe an object, found type `{0}`")]
    NotObjectType(String),
    #[error("schema `properties` must be an object")]
    InvalidProperties,
    #[error("property `{0}` must be described by an object")]
    InvalidProperty(String),
    #[error("property `{name}` declares unsupported type {kind}")]
    UnsupportedType { name: String, kind: String },
    #[error("property `{name}` declares an invalid pattern: {reason}")]
    InvalidPattern { name: String, reason: String },
    #[error("schema `required` must be an array of strings")]
    InvalidRequired,
    #[error("required field `{0}` is not declared and extra fields are forbidden")]
    UndeclaredRequired(String),
}

/// Rejection produced when arguments do not satisfy a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    #[error("missing required field `{0}`")]
    MissingField(String),
    #[error("field `{field}` must be of type {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },
    #[error("field `{field}` does not match pattern {pattern}")]
    PatternMismatch { field: String, pattern: String },
    #[error("unexpected field `{0}`")]
    UnexpectedField(String),
}

#[derive(Debug, Clone)]
struct PropertyRule {
    name: String,
    kind: Option<PrimitiveType>,
    pattern: Option<Regex>,
}

#[derive(Debug, Clone)]
pub struct ToolSchema {
    raw: Value,
    properties: Vec<PropertyRule>,
    required: Vec<String>,
    additional_properties: bool,
}

impl ToolSchema {
    pub fn compile(raw: Value) -> Result<Self, SchemaError> {
        let object = raw.as_object().ok_or(SchemaError::NotAnObject)?;

        if let Some(kind) = object.get("type") {
            if kind.as_str() != Some("object") {
                return Err(SchemaError::NotObjectType(kind.to_string()));
            }
        }

        let properties = match object.get("properties") {
            None => Vec::new(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(name, property)| compile_property(name, property))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(SchemaError::InvalidProperties),
        };

        let required = match object.get("required") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or(SchemaError::InvalidRequired)?,
            Some(_) => return Err(SchemaError::InvalidRequired),
        };

        // Anything other than a literal `false` (including a sub-schema) permits extra keys.
        let additional_properties = object
            .get("additionalProperties")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        if !additional_properties {
            if let Some(field) = required
                .iter()
                .find(|field| !properties.iter().any(|rule| &rule.name == *field))
            {
                return Err(SchemaError::UndeclaredRequired(field.clone()));
            }
        }

        Ok(Self {
            raw,
            properties,
            required,
            additional_properties,
        })
    }

    /// The schema exactly as it was declared, for listing.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|rule| rule.name.as_str())
    }

    pub fn validate(&self, arguments: Map<String, Value>) -> Result<Arguments, SchemaViolation> {
        if let Some(missing) = self
            .required
            .iter()
            .find(|field| !arguments.contains_key(field.as_str()))
        {
            return Err(SchemaViolation::MissingField(missing.clone()));
        }

        for rule in &self.properties {
            let Some(value) = arguments.get(&rule.name) else {
                continue;
            };

            if let Some(kind) = rule.kind {
                if !kind.matches(value) {
                    return Err(SchemaViolation::TypeMismatch {
                        field: rule.name.clone(),
                        expected: kind.as_str(),
                    });
                }
            }

            if let (Some(pattern), Some(text)) = (&rule.pattern, value.as_str()) {
                if !pattern.is_match(text) {
                    return Err(SchemaViolation::PatternMismatch {
                        field: rule.name.clone(),
                        pattern: pattern.as_str().to_string(),
                    });
                }
            }
        }

        if !self.additional_properties {
            if let Some(extra) = arguments
                .keys()
                .find(|key| !self.properties.iter().any(|rule| &rule.name == *key))
            {
                return Err(SchemaViolation::UnexpectedField(extra.clone()));
            }
        }

        Ok(Arguments(arguments))
    }
}

fn compile_property(name: &str, property: &Value) -> Result<PropertyRule, SchemaError> {
    let property = property
        .as_object()
        .ok_or_else(|| SchemaError::InvalidProperty(name.to_string()))?;

    let kind = match property.get("type") {
        None => None,
        Some(kind) => Some(
            kind.as_str()
                .and_then(PrimitiveType::parse)
                .ok_or_else(|| SchemaError::UnsupportedType {
                    name: name.to_string(),
                    kind: kind.to_string(),
                })?,
        ),
    };

    let pattern = match property.get("pattern") {
        None => None,
        Some(Value::String(pattern)) => {
            Some(Regex::new(pattern).map_err(|err| SchemaError::InvalidPattern {
                name: name.to_string(),
                reason: err.to_string(),
            })?)
        }
        Some(other) => {
            return Err(SchemaError::InvalidPattern {
                name: name.to_string(),
                reason: format!("expected a string, found {other}"),
            })
        }
    };

    Ok(PropertyRule {
        name: name.to_string(),
        kind,
        pattern,
    })
}

/// Arguments that passed schema validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn integer(&self, name: &str) -> Result<i128, ToolError> {
        let value = self.get(name);
        value
            .and_then(Value::as_i64)
            .map(i128::from)
            .or_else(|| value.and_then(Value::as_u64).map(i128::from))
            .ok_or_else(|| ToolError::Argument(name.to_string()))
    }

    pub fn string(&self, name: &str) -> Result<&str, ToolError> {
        self.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::Argument(name.to_string()))
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn pair_schema() -> ToolSchema {
        ToolSchema::compile(json!({
            "type": "object",
            "properties": {
                "a": {"type": "integer"},
                "b": {"type": "integer"}
            },
            "required": ["a", "b"],
            "additionalProperties": false
        }))
        .expect("schema compiles")
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn accepts_matching_arguments() {
        let arguments = pair_schema()
            .validate(object(json!({"a": 2, "b": -3})))
            .expect("valid arguments");

        assert_eq!(arguments.integer("a").expect("a"), 2);
        assert_eq!(arguments.integer("b").expect("b"), -3);
    }

    #[test]
    fn reports_missing_required_field() {
        let violation = pair_schema()
            .validate(object(json!({"a": 1})))
            .expect_err("b is missing");

        assert_eq!(violation, SchemaViolation::MissingField("b".to_string()));
        assert_eq!(violation.to_string(), "missing required field `b`");
    }

    #[test]
    fn reports_type_mismatch() {
        let violation = pair_schema()
            .validate(object(json!({"a": 2, "b": "x"})))
            .expect_err("b is a string");

        assert_eq!(
            violation,
            SchemaViolation::TypeMismatch {
                field: "b".to_string(),
                expected: "integer",
            }
        );
    }

    #[test]
    fn integer_rejects_fractional_numbers() {
        let violation = pair_schema()
            .validate(object(json!({"a": 2.5, "b": 1})))
            .expect_err("2.5 is not an integer");

        assert!(matches!(violation, SchemaViolation::TypeMismatch { .. }));
    }

    #[test]
    fn rejects_undeclared_fields_when_closed() {
        let violation = pair_schema()
            .validate(object(json!({"a": 1, "b": 2, "c": 3})))
            .expect_err("c is not declared");

        assert_eq!(violation, SchemaViolation::UnexpectedField("c".to_string()));
    }

    #[test]
    fn open_schema_allows_extra_fields() {
        let schema = ToolSchema::compile(json!({
            "type": "object",
            "properties": {"name": {"type": "string"}}
        }))
        .expect("schema compiles");

        let arguments = schema
            .validate(object(json!({"name": "x", "extra": true})))
            .expect("extra keys allowed");
        assert_eq!(arguments.into_inner().len(), 2);
    }

    #[test]
    fn required_fields_are_checked_before_types() {
        let violation = pair_schema()
            .validate(object(json!({"a": "x"})))
            .expect_err("missing and mistyped");

        assert_eq!(violation, SchemaViolation::MissingField("b".to_string()));
    }

    #[test]
    fn enforces_string_pattern() {
        let schema = ToolSchema::compile(json!({
            "type": "object",
            "properties": {
                "birthdate": {"type": "string", "pattern": "^[0-9]{4}-[0-9]{2}-[0-9]{2}$"}
            },
            "required": ["birthdate"]
        }))
        .expect("schema compiles");

        assert!(schema
            .validate(object(json!({"birthdate": "2024-06-15"})))
            .is_ok());
        let violation = schema
            .validate(object(json!({"birthdate": "15/06/2024"})))
            .expect_err("wrong format");
        assert!(matches!(violation, SchemaViolation::PatternMismatch { .. }));
        let violation = schema
            .validate(object(json!({"birthdate": "２０２４-０６-１５"})))
            .expect_err("full-width digits");
        assert!(matches!(violation, SchemaViolation::PatternMismatch { .. }));
    }

    #[test]
    fn compile_rejects_unknown_types_and_bad_patterns() {
        let unknown = ToolSchema::compile(json!({
            "type": "object",
            "properties": {"a": {"type": "decimal"}}
        }))
        .expect_err("decimal is not a primitive type");
        assert!(matches!(unknown, SchemaError::UnsupportedType { .. }));

        let pattern = ToolSchema::compile(json!({
            "type": "object",
            "properties": {"a": {"type": "string", "pattern": "("}}
        }))
        .expect_err("unbalanced group");
        assert!(matches!(pattern, SchemaError::InvalidPattern { .. }));
    }

    #[test]
    fn compile_rejects_unsatisfiable_required_field() {
        let error = ToolSchema::compile(json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}},
            "required": ["a", "z"],
            "additionalProperties": false
        }))
        .expect_err("z can never be supplied");

        assert_eq!(error, SchemaError::UndeclaredRequired("z".to_string()));
    }

    #[test]
    fn compile_rejects_non_object_schemas() {
        assert_eq!(
            ToolSchema::compile(json!([])).expect_err("array schema"),
            SchemaError::NotAnObject
        );
        assert!(matches!(
            ToolSchema::compile(json!({"type": "string"})).expect_err("string schema"),
            SchemaError::NotObjectType(_)
        ));
    }

    #[test]
    fn integer_accessor_covers_unsigned_range() {
        let arguments = pair_schema()
            .validate(object(json!({"a": u64::MAX, "b": 0})))
            .expect("u64 is an integer");

        assert_eq!(arguments.integer("a").expect("a"), i128::from(u64::MAX));
        assert!(arguments.string("a").is_err());
    }
}
