//! Declared output shapes and their validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::typed::extract_json;

/// An output that did not match its declared shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// The offending field, when attributable to one.
    pub field: Option<String>,
    /// What was wrong.
    pub message: String,
}

impl SchemaViolation {
    /// A violation of the document as a whole.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    /// A violation of a specific field.
    #[must_use]
    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref field) = self.field {
            write!(f, "Field '{}': {}", field, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for SchemaViolation {}

/// The type a field must have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Any JSON string.
    String,
    /// A JSON number, optionally bounded (inclusive).
    Number {
        /// Lower bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        /// Upper bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// A JSON boolean.
    Boolean,
    /// An array of strings.
    StringList,
    /// A string drawn from a fixed label set.
    OneOf {
        /// Allowed labels.
        values: Vec<String>,
    },
    /// Anything, as long as it is present.
    Any,
}

/// A named field in an output shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// JSON key.
    pub name: String,
    /// Expected type.
    #[serde(flatten)]
    pub kind: FieldKind,
    /// Whether the key must be present and non-null.
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    /// A required field.
    #[must_use]
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    /// An optional field (may be absent or null).
    #[must_use]
    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }

    fn check(&self, value: &Value) -> Result<(), SchemaViolation> {
        let field = self.name.as_str();
        match &self.kind {
            FieldKind::String => {
                if !value.is_string() {
                    return Err(SchemaViolation::for_field(field, "expected a string"));
                }
            }
            FieldKind::Number { min, max } => {
                let n = value
                    .as_f64()
                    .ok_or_else(|| SchemaViolation::for_field(field, "expected a number"))?;
                if let Some(lo) = min {
                    if n < *lo {
                        return Err(SchemaViolation::for_field(field, format!("{n} is below {lo}")));
                    }
                }
                if let Some(hi) = max {
                    if n > *hi {
                        return Err(SchemaViolation::for_field(field, format!("{n} is above {hi}")));
                    }
                }
            }
            FieldKind::Boolean => {
                if !value.is_boolean() {
                    return Err(SchemaViolation::for_field(field, "expected a boolean"));
                }
            }
            FieldKind::StringList => {
                let items = value
                    .as_array()
                    .ok_or_else(|| SchemaViolation::for_field(field, "expected an array"))?;
                if items.iter().any(|v| !v.is_string()) {
                    return Err(SchemaViolation::for_field(field, "expected only strings"));
                }
            }
            FieldKind::OneOf { values } => {
                let label = value
                    .as_str()
                    .ok_or_else(|| SchemaViolation::for_field(field, "expected a string label"))?;
                if !values.iter().any(|v| v == label) {
                    return Err(SchemaViolation::for_field(
                        field,
                        format!("'{label}' is not one of [{}]", values.join(", ")),
                    ));
                }
            }
            FieldKind::Any => {}
        }
        Ok(())
    }
}

/// The shape a stage's output must conform to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    /// Schema name, used in logs and error messages.
    pub name: String,
    /// Declared fields. Extra keys in the output are allowed.
    pub fields: Vec<FieldSpec>,
}

impl OutputSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Validates model text against this schema.
    ///
    /// The text may be wrapped in a Markdown code fence. Returns the parsed
    /// JSON object on success.
    pub fn validate(&self, text: &str) -> Result<Value, SchemaViolation> {
        let json = extract_json(text);
        let value: Value = serde_json::from_str(json)
            .map_err(|e| SchemaViolation::new(format!("output is not valid JSON: {e}")))?;
        self.validate_value(&value)?;
        Ok(value)
    }

    /// Validates an already-parsed JSON value.
    pub fn validate_value(&self, value: &Value) -> Result<(), SchemaViolation> {
        let object = value.as_object().ok_or_else(|| {
            SchemaViolation::new(format!("'{}' output must be a JSON object", self.name))
        })?;

        for spec in &self.fields {
            match object.get(&spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        return Err(SchemaViolation::for_field(&spec.name, "is required"));
                    }
                }
                Some(v) => spec.check(v)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification() -> OutputSchema {
        OutputSchema::new("ClassificationResult")
            .field(FieldSpec::required(
                "category",
                FieldKind::OneOf {
                    values: vec![
                        "information_request".into(),
                        "fraud_investigation".into(),
                        "kyc_update".into(),
                    ],
                },
            ))
            .field(FieldSpec::optional(
                "confidence",
                FieldKind::Number {
                    min: Some(0.0),
                    max: Some(1.0),
                },
            ))
            .field(FieldSpec::optional("explanation", FieldKind::String))
    }

    #[test]
    fn test_valid_output() {
        let value = classification()
            .validate(r#"{"category": "kyc_update", "confidence": 0.9}"#)
            .unwrap();
        assert_eq!(value["category"], "kyc_update");
    }

    #[test]
    fn test_fenced_output() {
        let text = "```json\n{\"category\": \"fraud_investigation\"}\n```";
        assert!(classification().validate(text).is_ok());
    }

    #[test]
    fn test_unknown_label() {
        let err = classification().validate(r#"{"category": "spam"}"#).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("category"));
        assert!(err.message.contains("spam"));
    }

    #[test]
    fn test_out_of_range_number() {
        let err = classification()
            .validate(r#"{"category": "kyc_update", "confidence": 1.5}"#)
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("confidence"));
    }

    #[test]
    fn test_missing_required() {
        let err = classification().validate(r#"{"confidence": 0.5}"#).unwrap_err();
        assert_eq!(err.to_string(), "Field 'category': is required");
    }

    #[test]
    fn test_optional_null_allowed() {
        assert!(classification()
            .validate(r#"{"category": "kyc_update", "explanation": null}"#)
            .is_ok());
    }

    #[test]
    fn test_not_json() {
        let err = classification().validate("The category is kyc_update").unwrap_err();
        assert!(err.field.is_none());
        assert!(err.message.contains("not valid JSON"));
    }

    #[test]
    fn test_not_an_object() {
        assert!(classification().validate("[1, 2]").is_err());
    }

    #[test]
    fn test_string_list() {
        let schema = OutputSchema::new("Fraud")
            .field(FieldSpec::required("suspicious_patterns", FieldKind::StringList))
            .field(FieldSpec::required("is_fraud", FieldKind::Boolean));
        assert!(schema
            .validate(r#"{"suspicious_patterns": ["velocity"], "is_fraud": false}"#)
            .is_ok());
        assert!(schema
            .validate(r#"{"suspicious_patterns": [1], "is_fraud": false}"#)
            .is_err());
    }

    #[test]
    fn test_schema_deserialize() {
        let schema: OutputSchema = serde_json::from_str(
            r#"{
                "name": "Score",
                "fields": [
                    {"name": "risk_score", "type": "number", "min": 0.0, "max": 1.0},
                    {"name": "notes", "type": "string", "required": false}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(schema.fields.len(), 2);
        assert!(schema.fields[0].required);
        assert!(!schema.fields[1].required);
        assert!(schema.validate(r#"{"risk_score": 0.3}"#).is_ok());
    }
}
