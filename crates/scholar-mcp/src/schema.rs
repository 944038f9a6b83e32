//! Tool parameter schema cleanup for the Gemini function-declaration dialect.

use serde_json::{Map, Value};

/// Schema keys the model endpoint rejects.
pub const UNSUPPORTED_KEYS: &[&str] = &[
    "exclusiveMaximum",
    "exclusiveMinimum",
    "const",
    "examples",
    "additionalProperties",
    "$schema",
    "$id",
    "definitions",
];

/// The only `format` values accepted on string-typed nodes.
pub const SUPPORTED_STRING_FORMATS: &[&str] = &["enum", "date-time"];

/// Strips schema metadata the model endpoint does not understand.
///
/// Pure and total: anything it does not recognise is dropped or passed
/// through, never rejected. Backends are outside our control, so a malformed
/// schema degrades rather than failing setup.
pub struct SchemaSanitizer;

impl SchemaSanitizer {
    /// Sanitize a schema tree. Non-object inputs are returned unchanged.
    pub fn sanitize(schema: &Value) -> Value {
        match schema {
            Value::Object(node) => Value::Object(Self::sanitize_node(node)),
            other => other.clone(),
        }
    }

    fn sanitize_node(node: &Map<String, Value>) -> Map<String, Value> {
        let is_string_node = node.get("type").and_then(Value::as_str) == Some("string");

        node.iter()
            .filter(|(key, value)| {
                if UNSUPPORTED_KEYS.contains(&key.as_str()) {
                    return false;
                }
                match (key.as_str(), value.as_str()) {
                    ("format", Some(format)) if is_string_node => {
                        SUPPORTED_STRING_FORMATS.contains(&format)
                    }
                    _ => true,
                }
            })
            .map(|(key, value)| (key.clone(), Self::sanitize_child(value)))
            .collect()
    }

    fn sanitize_child(value: &Value) -> Value {
        match value {
            Value::Object(node) => Value::Object(Self::sanitize_node(node)),
            Value::Array(items) => Value::Array(items.iter().map(Self::sanitize_child).collect()),
            other => other.clone(),
        }
    }
}
