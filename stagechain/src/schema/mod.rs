//! Structured output shapes.
//!
//! A stage may declare the shape its output must have (named, typed fields).
//! Validation happens at the invocation boundary, before the executor
//! accepts the result.

mod shape;
mod typed;

pub use shape::{FieldKind, FieldSpec, OutputSchema, SchemaViolation};
pub use typed::{extract_json, parse_typed, validate_typed};
