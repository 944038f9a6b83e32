use crate::backend::{Backend, BackendId, BackendRef};
use crate::client::McpClient;
use crate::registry::{CapabilityRecord, CapabilityRegistry};
use async_trait::async_trait;
use scholar_core::{CapabilityKind, ScholarError, ScholarResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Launch parameters for a single MCP server.
#[derive(Debug, Clone, Deserialize)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables, added on top of the inherited environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

/// A configured server and the name it is known by.
#[derive(Debug, Clone)]
pub struct ServerDefinition {
    pub name: String,
    pub config: McpServerConfig,
}

#[derive(Deserialize)]
struct ServersFile {
    #[serde(default, rename = "mcpServers")]
    mcp_servers: serde_json::Map<String, serde_json::Value>,
}

/// Parse a `{"mcpServers": {name: {command, args, env?}}}` document,
/// keeping the servers in file order.
pub fn parse_server_definitions(json: &str) -> ScholarResult<Vec<ServerDefinition>> {
    let file: ServersFile = serde_json::from_str(json)?;
    file.mcp_servers
        .into_iter()
        .map(|(name, value)| {
            let config: McpServerConfig = serde_json::from_value(value).map_err(|e| {
                ScholarError::Config(format!("Invalid config for server '{name}': {e}"))
            })?;
            Ok(ServerDefinition { name, config })
        })
        .collect()
}

/// Opens a connection to one configured server.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self, name: &str, config: &McpServerConfig)
        -> ScholarResult<Arc<dyn Backend>>;
}

/// Spawns each server as a child process and talks to it over stdio.
pub struct StdioConnector;

#[async_trait]
impl BackendConnector for StdioConnector {
    async fn connect(
        &self,
        name: &str,
        config: &McpServerConfig,
    ) -> ScholarResult<Arc<dyn Backend>> {
        let client = McpClient::connect(name, config).await?;
        Ok(Arc::new(client))
    }
}

/// Outcome of connecting every configured server.
#[derive(Debug, Default)]
pub struct SetupReport {
    /// Servers that connected and listed their tools.
    pub connected: Vec<String>,
    /// One entry per server that failed.
    pub failures: Vec<ScholarError>,
    pub tool_count: usize,
    pub prompt_count: usize,
    pub resource_count: usize,
}

impl SetupReport {
    /// Whether the model would have anything to call.
    pub fn has_tools(&self) -> bool {
        self.tool_count > 0
    }
}

/// Internal state for a managed server.
struct ManagedServer {
    id: BackendId,
    name: String,
    backend: Arc<dyn Backend>,
}

/// Owns every backend connection for the lifetime of the process.
///
/// Connections are acquired one at a time in configuration order and
/// released in reverse order, either by [`McpServerManager::shutdown`] or,
/// on any other exit path, when the manager is dropped.
pub struct McpServerManager {
    connector: Box<dyn BackendConnector>,
    servers: Vec<ManagedServer>,
    next_id: usize,
}

impl McpServerManager {
    pub fn new() -> Self {
        Self::with_connector(StdioConnector)
    }

    pub fn with_connector(connector: impl BackendConnector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            servers: Vec::new(),
            next_id: 0,
        }
    }

    /// Connect to all configured servers and register their capabilities.
    ///
    /// A server that fails is logged and skipped; the rest still connect.
    pub async fn connect_all(
        &mut self,
        servers: &[ServerDefinition],
        registry: &mut CapabilityRegistry,
    ) -> SetupReport {
        let mut report = SetupReport::default();

        for server in servers {
            info!(server = %server.name, command = %server.config.command, "Connecting to MCP server");
            match self.connect_server(server, registry).await {
                Ok(tool_count) => {
                    info!(server = %server.name, tools = tool_count, "MCP server connected");
                    report.connected.push(server.name.clone());
                }
                Err(e) => {
                    warn!(server = %server.name, error = %e, "Failed to connect MCP server");
                    report.failures.push(e);
                }
            }
        }

        report.tool_count = registry.count(CapabilityKind::Tool);
        report.prompt_count = registry.count(CapabilityKind::Prompt);
        report.resource_count = registry.count(CapabilityKind::Resource);
        report
    }

    /// Connect to a single server and register what it advertises.
    async fn connect_server(
        &mut self,
        server: &ServerDefinition,
        registry: &mut CapabilityRegistry,
    ) -> ScholarResult<usize> {
        let connection_failed = |e: ScholarError| ScholarError::ConnectionFailed {
            server: server.name.clone(),
            reason: e.to_string(),
        };

        let backend = self
            .connector
            .connect(&server.name, &server.config)
            .await
            .map_err(connection_failed)?;

        // Owned from here on, whatever happens while listing.
        let id = BackendId(self.next_id);
        self.next_id += 1;
        self.servers.push(ManagedServer {
            id,
            name: server.name.clone(),
            backend: backend.clone(),
        });

        let handle = BackendRef::new(id, &backend);
        registry.register_backend(handle.clone());

        let tools = backend.list_tools().await.map_err(connection_failed)?;
        for tool in &tools {
            registry.register(CapabilityRecord::tool(tool, handle.clone()));
            debug!(server = %server.name, tool = %tool.name, "Tool loaded");
        }

        Self::register_optional(&server.name, "prompts", backend.list_prompts().await, |prompts| {
            for prompt in &prompts {
                registry.register(CapabilityRecord::prompt(prompt, handle.clone()));
                debug!(server = %server.name, prompt = %prompt.name, "Prompt loaded");
            }
        });

        Self::register_optional(&server.name, "resources", backend.list_resources().await, |resources| {
            for resource in resources {
                debug!(server = %server.name, uri = %resource.uri, "Resource available");
                registry.register(CapabilityRecord::resource(resource.uri, handle.clone()));
            }
        });

        Self::register_optional(
            &server.name,
            "resource templates",
            backend.list_resource_templates().await,
            |templates| {
                for template in templates {
                    debug!(server = %server.name, uri = %template.uri_template, "Resource template available");
                    registry.register(CapabilityRecord::resource(template.uri_template, handle.clone()));
                }
            },
        );

        Ok(tools.len())
    }

    /// Apply an optional listing. Unsupported means empty; real faults are logged.
    fn register_optional<T>(
        server: &str,
        what: &str,
        listing: ScholarResult<Vec<T>>,
        register: impl FnOnce(Vec<T>),
    ) {
        match listing {
            Ok(items) => register(items),
            Err(e) if e.is_unsupported() => {
                info!(server = %server, "Server does not provide {what}");
            }
            Err(e) => {
                warn!(server = %server, error = %e, "Could not list {what}");
            }
        }
    }

    /// Names of every acquired connection, in acquisition order.
    pub fn server_names(&self) -> Vec<&str> {
        self.servers.iter().map(|s| s.name.as_str()).collect()
    }

    /// Get the number of managed servers.
    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    /// Release every connection, most recently acquired first.
    pub async fn shutdown(&mut self) {
        while let Some(server) = self.servers.pop() {
            debug!(server = %server.name, id = %server.id, "Releasing MCP server");
            server.backend.shutdown().await;
        }
    }
}

impl Default for McpServerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for McpServerManager {
    fn drop(&mut self) {
        // Vec drops front to back; release in reverse acquisition order instead.
        while let Some(server) = self.servers.pop() {
            debug!(server = %server.name, "Dropping MCP server connection");
            drop(server);
        }
    }
}
