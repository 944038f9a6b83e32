//! The backend capability protocol, as consumed by the registry and routers.

use crate::protocol::{
    McpGetPromptResult, McpPromptDef, McpReadResourceResult, McpResourceDef, McpResourceTemplate,
    McpToolDef,
};
use async_trait::async_trait;
use scholar_core::{ScholarError, ScholarResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// One connection to an out-of-process capability server.
///
/// Listing methods return [`ScholarError::CapabilityUnsupported`] when the
/// server does not implement that listing; callers treat that as an empty list.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Configured name of the server.
    fn name(&self) -> &str;

    async fn list_tools(&self) -> ScholarResult<Vec<McpToolDef>>;

    async fn list_prompts(&self) -> ScholarResult<Vec<McpPromptDef>>;

    async fn list_resources(&self) -> ScholarResult<Vec<McpResourceDef>>;

    async fn list_resource_templates(&self) -> ScholarResult<Vec<McpResourceTemplate>> {
        Err(ScholarError::CapabilityUnsupported(format!(
            "{}: resources/templates/list",
            self.name()
        )))
    }

    /// Invoke a tool and return its raw content.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> ScholarResult<serde_json::Value>;

    async fn get_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> ScholarResult<McpGetPromptResult>;

    async fn read_resource(&self, uri: &str) -> ScholarResult<McpReadResourceResult>;

    /// Release the connection. Called once, at process shutdown.
    async fn shutdown(&self) {}
}

/// Identity of an acquired connection, assigned in acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId(pub usize);

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Non-owning handle to a backend.
///
/// The manager owns every connection; records in the registry only point back
/// at it, so a released connection can never be resurrected by a lookup.
#[derive(Clone)]
pub struct BackendRef {
    id: BackendId,
    name: String,
    inner: Weak<dyn Backend>,
}

impl BackendRef {
    pub fn new(id: BackendId, backend: &Arc<dyn Backend>) -> Self {
        Self {
            id,
            name: backend.name().to_string(),
            inner: Arc::downgrade(backend),
        }
    }

    pub fn id(&self) -> BackendId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrow the live connection, failing if it has already been released.
    pub fn upgrade(&self) -> ScholarResult<Arc<dyn Backend>> {
        self.inner.upgrade().ok_or_else(|| {
            ScholarError::ExecutionFailed(format!(
                "connection to '{}' has been released",
                self.name
            ))
        })
    }
}

impl fmt::Debug for BackendRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRef")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct Idle;

    #[async_trait]
    impl Backend for Idle {
        fn name(&self) -> &str {
            "idle"
        }
        async fn list_tools(&self) -> ScholarResult<Vec<McpToolDef>> {
            Ok(vec![])
        }
        async fn list_prompts(&self) -> ScholarResult<Vec<McpPromptDef>> {
            Ok(vec![])
        }
        async fn list_resources(&self) -> ScholarResult<Vec<McpResourceDef>> {
            Ok(vec![])
        }
        async fn call_tool(
            &self,
            _: &str,
            _: serde_json::Value,
        ) -> ScholarResult<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn get_prompt(
            &self,
            _: &str,
            _: &HashMap<String, String>,
        ) -> ScholarResult<McpGetPromptResult> {
            Err(ScholarError::CapabilityUnsupported("idle".into()))
        }
        async fn read_resource(&self, _: &str) -> ScholarResult<McpReadResourceResult> {
            Err(ScholarError::CapabilityUnsupported("idle".into()))
        }
    }

    #[tokio::test]
    async fn test_templates_unsupported_by_default() {
        let err = Idle.list_resource_templates().await.unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_ref_does_not_keep_backend_alive() {
        let backend: Arc<dyn Backend> = Arc::new(Idle);
        let handle = BackendRef::new(BackendId(3), &backend);
        assert_eq!(handle.id().to_string(), "#3");
        assert!(handle.upgrade().is_ok());

        drop(backend);
        let err = handle.upgrade().err().unwrap();
        assert!(err.to_string().contains("'idle' has been released"));
    }
}
