//! Typed access to validated structured output.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{OutputSchema, SchemaViolation};

/// Strips an optional Markdown code fence (```` ```json ... ``` ````) around JSON text.
#[must_use]
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        // Single-line fence: skip an optional language tag.
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    let body = body.trim();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Deserializes a validated value into a caller-defined struct.
pub fn parse_typed<T: DeserializeOwned>(value: Value) -> Result<T, SchemaViolation> {
    serde_json::from_value(value)
        .map_err(|e| SchemaViolation::new(format!("Deserialization error: {e}")))
}

/// Validates text against a schema, then deserializes it into `T`.
pub fn validate_typed<T: DeserializeOwned>(
    schema: &OutputSchema,
    text: &str,
) -> Result<T, SchemaViolation> {
    parse_typed(schema.validate(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSpec};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct FraudAnalysis {
        risk_score: f64,
        suspicious_patterns: Vec<String>,
    }

    fn fraud_schema() -> OutputSchema {
        OutputSchema::new("FraudAnalysis")
            .field(FieldSpec::required(
                "risk_score",
                FieldKind::Number {
                    min: Some(0.0),
                    max: Some(1.0),
                },
            ))
            .field(FieldSpec::required("suspicious_patterns", FieldKind::StringList))
    }

    #[test]
    fn test_extract_plain() {
        assert_eq!(extract_json("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_fenced_with_language() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_fenced_without_language() {
        assert_eq!(extract_json("```\n[1]\n```\n"), "[1]");
    }

    #[test]
    fn test_extract_single_line_fence() {
        assert_eq!(
            extract_json("```{\"category\": \"billing\"}```"),
            "{\"category\": \"billing\"}"
        );
    }

    #[test]
    fn test_extract_single_line_fence_with_language() {
        assert_eq!(
            extract_json("```json {\"category\":\"billing\"} ```"),
            "{\"category\":\"billing\"}"
        );
    }

    #[test]
    fn test_validate_single_line_fence() {
        let schema = OutputSchema::new("Label").field(FieldSpec::required("category", FieldKind::String));
        let value = schema.validate("```json {\"category\": \"billing\"} ```").unwrap();
        assert_eq!(value["category"], "billing");
    }

    #[test]
    fn test_validate_typed() {
        let parsed: FraudAnalysis = validate_typed(
            &fraud_schema(),
            r#"{"risk_score": 0.8, "suspicious_patterns": ["night transfer"]}"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            FraudAnalysis {
                risk_score: 0.8,
                suspicious_patterns: vec!["night transfer".to_string()],
            }
        );
    }

    #[test]
    fn test_parse_typed_mismatch() {
        let err = parse_typed::<FraudAnalysis>(serde_json::json!({"risk_score": "high"})).unwrap_err();
        assert!(err.message.contains("Deserialization error"));
    }
}
