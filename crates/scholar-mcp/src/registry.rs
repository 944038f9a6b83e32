use crate::backend::BackendRef;
use crate::protocol::{McpPromptDef, McpToolDef};
use crate::schema::SchemaSanitizer;
use scholar_core::{CapabilityKind, ToolDeclaration};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Kind-specific metadata of a [`CapabilityRecord`].
#[derive(Debug, Clone)]
pub enum CapabilityDetail {
    Tool {
        description: String,
        /// Parameter schema, already sanitized.
        parameters: serde_json::Value,
    },
    Prompt {
        description: Option<String>,
        arguments: Vec<String>,
    },
    Resource,
}

/// One capability advertised by a backend.
#[derive(Debug, Clone)]
pub struct CapabilityRecord {
    /// Tool name, prompt name, or resource URI (possibly a URI template).
    pub identifier: String,
    /// The backend that serves this capability.
    pub backend: BackendRef,
    pub detail: CapabilityDetail,
}

impl CapabilityRecord {
    pub fn tool(def: &McpToolDef, backend: BackendRef) -> Self {
        Self {
            identifier: def.name.clone(),
            backend,
            detail: CapabilityDetail::Tool {
                description: def.description.clone(),
                parameters: SchemaSanitizer::sanitize(&def.input_schema),
            },
        }
    }

    pub fn prompt(def: &McpPromptDef, backend: BackendRef) -> Self {
        Self {
            identifier: def.name.clone(),
            backend,
            detail: CapabilityDetail::Prompt {
                description: def.description.clone(),
                arguments: def.arguments.iter().map(|a| a.name.clone()).collect(),
            },
        }
    }

    pub fn resource(uri: impl Into<String>, backend: BackendRef) -> Self {
        Self {
            identifier: uri.into(),
            backend,
            detail: CapabilityDetail::Resource,
        }
    }

    pub fn kind(&self) -> CapabilityKind {
        match self.detail {
            CapabilityDetail::Tool { .. } => CapabilityKind::Tool,
            CapabilityDetail::Prompt { .. } => CapabilityKind::Prompt,
            CapabilityDetail::Resource => CapabilityKind::Resource,
        }
    }

    /// The declaration handed to the model endpoint, for tool records.
    pub fn tool_declaration(&self) -> Option<ToolDeclaration> {
        match &self.detail {
            CapabilityDetail::Tool {
                description,
                parameters,
            } => Some(ToolDeclaration {
                name: self.identifier.clone(),
                description: description.clone(),
                parameters: parameters.clone(),
            }),
            _ => None,
        }
    }
}

/// Records of one kind, in registration order, with an exact-match index.
#[derive(Default)]
struct Namespace {
    entries: Vec<CapabilityRecord>,
    index: HashMap<String, usize>,
}

impl Namespace {
    /// Insert or overwrite. An overwritten record keeps its original position.
    fn insert(&mut self, record: CapabilityRecord) -> Option<CapabilityRecord> {
        match self.index.get(&record.identifier) {
            Some(&pos) => Some(std::mem::replace(&mut self.entries[pos], record)),
            None => {
                self.index
                    .insert(record.identifier.clone(), self.entries.len());
                self.entries.push(record);
                None
            }
        }
    }

    fn exact(&self, identifier: &str) -> Option<&CapabilityRecord> {
        self.index.get(identifier).map(|&pos| &self.entries[pos])
    }

    fn first_with_prefix(&self, prefix: &str) -> Option<&CapabilityRecord> {
        self.entries
            .iter()
            .find(|r| r.identifier.starts_with(prefix))
    }
}

/// The scheme prefix of an address, delimiter included: `papers://x` → `papers://`.
pub fn scheme_prefix(identifier: &str) -> Option<&str> {
    identifier
        .find("://")
        .map(|pos| &identifier[..pos + "://".len()])
}

/// Maps capability identifiers to the backends that serve them.
///
/// Tools, prompts, and resources live in separate namespaces, so a tool and a
/// prompt may share a name. Populated during setup, read-only afterwards.
#[derive(Default)]
pub struct CapabilityRegistry {
    tools: Namespace,
    prompts: Namespace,
    resources: Namespace,
    backends: Vec<BackendRef>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connected backend, even if it ends up serving nothing.
    pub fn register_backend(&mut self, backend: BackendRef) {
        if self.backends.iter().all(|b| b.id() != backend.id()) {
            self.backends.push(backend);
        }
    }

    /// Insert or overwrite a record in its kind's namespace.
    pub fn register(&mut self, record: CapabilityRecord) {
        let kind = record.kind();
        let identifier = record.identifier.clone();
        let owner = record.backend.name().to_string();
        let owner_id = record.backend.id();
        self.register_backend(record.backend.clone());

        let replaced = self.namespace_mut(kind).insert(record);
        match replaced {
            Some(previous) if previous.backend.id() != owner_id => {
                warn!(
                    kind = %kind,
                    identifier = %identifier,
                    previous = %previous.backend.name(),
                    current = %owner,
                    "Capability shadowed by a later backend"
                );
            }
            _ => debug!(kind = %kind, identifier = %identifier, server = %owner, "Registered capability"),
        }
    }

    /// Exact match first; otherwise, for `scheme://` addresses, the first
    /// record registered under the same scheme prefix.
    pub fn resolve(&self, kind: CapabilityKind, identifier: &str) -> Option<&CapabilityRecord> {
        let namespace = self.namespace(kind);
        namespace.exact(identifier).or_else(|| {
            scheme_prefix(identifier).and_then(|prefix| namespace.first_with_prefix(prefix))
        })
    }

    /// Records of one kind, in registration order.
    pub fn records(&self, kind: CapabilityKind) -> &[CapabilityRecord] {
        &self.namespace(kind).entries
    }

    /// Every distinct backend, in the order it was first registered.
    pub fn backends(&self) -> &[BackendRef] {
        &self.backends
    }

    /// Tool declarations for the model endpoint, in registration order.
    pub fn tool_declarations(&self) -> Vec<ToolDeclaration> {
        self.tools
            .entries
            .iter()
            .filter_map(CapabilityRecord::tool_declaration)
            .collect()
    }

    pub fn count(&self, kind: CapabilityKind) -> usize {
        self.namespace(kind).entries.len()
    }

    fn namespace(&self, kind: CapabilityKind) -> &Namespace {
        match kind {
            CapabilityKind::Tool => &self.tools,
            CapabilityKind::Prompt => &self.prompts,
            CapabilityKind::Resource => &self.resources,
        }
    }

    fn namespace_mut(&mut self, kind: CapabilityKind) -> &mut Namespace {
        match kind {
            CapabilityKind::Tool => &mut self.tools,
            CapabilityKind::Prompt => &mut self.prompts,
            CapabilityKind::Resource => &mut self.resources,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::backend::{Backend, BackendId};
    use crate::protocol::*;
    use async_trait::async_trait;
    use scholar_core::{ScholarError, ScholarResult};
    use std::sync::Arc;

    struct NullBackend(&'static str);

    #[async_trait]
    impl Backend for NullBackend {
        fn name(&self) -> &str {
            self.0
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
        async fn call_tool(&self, _: &str, _: serde_json::Value) -> ScholarResult<serde_json::Value> {
            Err(ScholarError::ExecutionFailed("unused".into()))
        }
        async fn get_prompt(
            &self,
            _: &str,
            _: &HashMap<String, String>,
        ) -> ScholarResult<McpGetPromptResult> {
            Err(ScholarError::ExecutionFailed("unused".into()))
        }
        async fn read_resource(&self, _: &str) -> ScholarResult<McpReadResourceResult> {
            Err(ScholarError::ExecutionFailed("unused".into()))
        }
    }

    fn backend(id: usize, name: &'static str) -> (Arc<dyn Backend>, BackendRef) {
        let arc: Arc<dyn Backend> = Arc::new(NullBackend(name));
        let handle = BackendRef::new(BackendId(id), &arc);
        (arc, handle)
    }

    #[test]
    fn test_scheme_prefix() {
        assert_eq!(scheme_prefix("papers://quantum"), Some("papers://"));
        assert_eq!(scheme_prefix("papers://"), Some("papers://"));
        assert_eq!(scheme_prefix("search_papers"), None);
    }

    #[test]
    fn test_exact_match_wins_over_prefix() {
        let (_a, first) = backend(0, "first");
        let (_b, second) = backend(1, "second");
        let mut registry = CapabilityRegistry::new();
        registry.register(CapabilityRecord::resource("papers://{topic}", first));
        registry.register(CapabilityRecord::resource("papers://folders", second));

        let hit = registry
            .resolve(CapabilityKind::Resource, "papers://folders")
            .unwrap();
        assert_eq!(hit.backend.name(), "second");
    }

    #[test]
    fn test_prefix_fallback_picks_first_registered() {
        let (_a, first) = backend(0, "first");
        let (_b, second) = backend(1, "second");
        let mut registry = CapabilityRegistry::new();
        registry.register(CapabilityRecord::resource("papers://folders", first));
        registry.register(CapabilityRecord::resource("papers://{topic}", second));

        let hit = registry
            .resolve(CapabilityKind::Resource, "papers://quantum_computing")
            .unwrap();
        assert_eq!(hit.backend.name(), "first");
        assert!(registry
            .resolve(CapabilityKind::Resource, "notes://quantum")
            .is_none());
    }

    #[test]
    fn test_namespaces_are_separate() {
        let (_a, owner) = backend(0, "research");
        let mut registry = CapabilityRegistry::new();
        registry.register(CapabilityRecord::resource("fetch", owner.clone()));
        assert!(registry.resolve(CapabilityKind::Tool, "fetch").is_none());
        assert!(registry.resolve(CapabilityKind::Resource, "fetch").is_some());
        assert_eq!(registry.backends().len(), 1);
    }

    #[test]
    fn test_overwrite_keeps_position_and_replaces_owner() {
        let (_a, first) = backend(0, "first");
        let (_b, second) = backend(1, "second");
        let tool = |name: &str| McpToolDef {
            name: name.to_string(),
            description: String::new(),
            input_schema: serde_json::json!({"type": "object", "additionalProperties": false}),
        };
        let mut registry = CapabilityRegistry::new();
        registry.register(CapabilityRecord::tool(&tool("search_papers"), first.clone()));
        registry.register(CapabilityRecord::tool(&tool("extract_info"), first));
        registry.register(CapabilityRecord::tool(&tool("search_papers"), second));

        let decls = registry.tool_declarations();
        let names: Vec<&str> = decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["search_papers", "extract_info"]);
        assert!(decls[0].parameters.get("additionalProperties").is_none());
        let owner = registry
            .resolve(CapabilityKind::Tool, "search_papers")
            .unwrap();
        assert_eq!(owner.backend.name(), "second");
        assert_eq!(registry.count(CapabilityKind::Tool), 2);
    }
}
