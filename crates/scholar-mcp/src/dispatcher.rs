use crate::registry::CapabilityRegistry;
use scholar_core::{CapabilityKind, ScholarError};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Keyed tool output, ready to be sent back as a function response.
pub type NormalizedContent = Map<String, Value>;

/// Failure of a single tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No backend advertises a tool by this name.
    #[error("Tool '{0}' not found on any server")]
    NotFound(String),

    /// The owning backend failed to run the tool.
    #[error("Tool '{name}' failed: {detail}")]
    ExecutionFailed {
        /// Requested tool.
        name: String,
        /// Backend- or transport-side cause.
        detail: String,
    },
}

impl From<ToolError> for ScholarError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::NotFound(name) => ScholarError::not_found(CapabilityKind::Tool, name),
            ToolError::ExecutionFailed { name, detail } => {
                ScholarError::ExecutionFailed(format!("{name}: {detail}"))
            }
        }
    }
}

/// Routes tool calls to the backend that advertised the tool.
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<CapabilityRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    /// Invoke `name` on its owning backend.
    ///
    /// Every backend or transport failure comes back as
    /// [`ToolError::ExecutionFailed`]; nothing escapes as a raw fault.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<NormalizedContent, ToolError> {
        let record = self
            .registry
            .resolve(CapabilityKind::Tool, name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        info!(tool = %name, server = %record.backend.name(), "Dispatching tool call");

        let outcome = match record.backend.upgrade() {
            Ok(backend) => backend.call_tool(name, Value::Object(arguments)).await,
            Err(e) => Err(e),
        };
        let raw = outcome.map_err(|e| {
            error!(tool = %name, error = %e, "Tool execution failed");
            ToolError::ExecutionFailed {
                name: name.to_string(),
                detail: e.to_string(),
            }
        })?;

        Ok(normalize(raw))
    }
}

/// Shape raw tool output into a keyed mapping.
///
/// Sequences become `{results: [...]}`, mappings pass through, and anything
/// else becomes `{message: "<text>"}`.
pub fn normalize(raw: Value) -> NormalizedContent {
    match raw {
        Value::Object(map) => map,
        Value::Array(items) => {
            let mut map = Map::new();
            map.insert("results".to_string(), Value::Array(items));
            map
        }
        other => {
            let message = match other {
                Value::String(s) => s,
                scalar => scalar.to_string(),
            };
            let mut map = Map::new();
            map.insert("message".to_string(), Value::String(message));
            map
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_sequence() {
        let out = normalize(json!([{"type": "text", "text": "Title: Attention"}]));
        assert_eq!(
            Value::Object(out),
            json!({"results": [{"type": "text", "text": "Title: Attention"}]})
        );
    }

    #[test]
    fn test_normalize_scalar() {
        assert_eq!(
            Value::Object(normalize(json!("no papers found"))),
            json!({"message": "no papers found"})
        );
        assert_eq!(Value::Object(normalize(json!(3))), json!({"message": "3"}));
        assert_eq!(Value::Object(normalize(Value::Null)), json!({"message": "null"}));
    }

    #[test]
    fn test_normalize_mapping_passes_through() {
        let raw = json!({"title": "Attention", "authors": ["Vaswani"]});
        assert_eq!(Value::Object(normalize(raw.clone())), raw);
    }

    #[test]
    fn test_tool_error_into_scholar_error() {
        let err: ScholarError = ToolError::NotFound("fetch".into()).into();
        assert!(matches!(err, ScholarError::CapabilityNotFound { .. }));
        let err: ScholarError = ToolError::ExecutionFailed {
            name: "fetch".into(),
            detail: "boom".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Execution failed: fetch: boom");
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool() {
        let dispatcher = ToolDispatcher::new(Arc::new(CapabilityRegistry::new()));
        let err = dispatcher.invoke("missing", Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(name) if name == "missing"));
    }
}
