//! MCP client: connects to an MCP server via stdio (subprocess) and
//! exchanges JSON-RPC 2.0 messages.

use crate::backend::Backend;
use crate::manager::McpServerConfig;
use crate::protocol::*;
use async_trait::async_trait;
use scholar_core::{ScholarError, ScholarResult};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// MCP client that communicates with an MCP server over stdio.
pub struct McpClient {
    stdin: Arc<Mutex<ChildStdin>>,
    child: Arc<Mutex<Child>>,
    pending: PendingMap,
    next_id: Arc<AtomicU64>,
    server_name: String,
    capabilities: ServerCapabilities,
    request_timeout: Duration,
}

impl McpClient {
    /// Spawn an MCP server subprocess and perform the initialization handshake.
    pub async fn connect(server_name: &str, config: &McpServerConfig) -> ScholarResult<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ScholarError::ExecutionFailed(format!(
                "Failed to spawn MCP server '{}': {}",
                config.command, e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ScholarError::Protocol("MCP server stdin not available".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ScholarError::Protocol("MCP server stdout not available".into()))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let stdin = Arc::new(Mutex::new(stdin));

        tokio::spawn(read_loop(
            BufReader::new(stdout),
            stdin.clone(),
            pending.clone(),
            server_name.to_string(),
        ));

        let mut client = Self {
            stdin,
            child: Arc::new(Mutex::new(child)),
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
            server_name: server_name.to_string(),
            capabilities: ServerCapabilities::default(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        };

        let init_result = client.initialize().await?;
        info!(
            server = %client.server_name,
            version = %init_result.protocol_version,
            "MCP server initialized"
        );
        client.capabilities = init_result.capabilities;

        client.notify("notifications/initialized", None).await?;

        Ok(client)
    }

    /// Send a JSON-RPC request and wait for the response.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> ScholarResult<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);

        let (tx, rx) = oneshot::channel();
        {
            let mut map = self.pending.lock().await;
            map.insert(id, tx);
        }

        let msg = serde_json::to_string(&req)?;
        if let Err(e) = self.write_line(&msg).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let resp = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(_)) => {
                return Err(ScholarError::ExecutionFailed(format!(
                    "MCP server '{}' closed before answering '{}'",
                    self.server_name, method
                )))
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(ScholarError::ExecutionFailed(format!(
                    "MCP request '{}' timed out",
                    method
                )));
            }
        };

        if let Some(err) = resp.error {
            if err.code == METHOD_NOT_FOUND {
                return Err(ScholarError::CapabilityUnsupported(format!(
                    "{}: {}",
                    self.server_name, method
                )));
            }
            return Err(ScholarError::ExecutionFailed(format!(
                "MCP error {}: {}",
                err.code, err.message
            )));
        }

        resp.result
            .ok_or_else(|| ScholarError::Protocol(format!("Empty {} result", method)))
    }

    /// Send a JSON-RPC notification (no response expected).
    async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> ScholarResult<()> {
        let msg = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params.unwrap_or(serde_json::json!({})),
        });
        self.write_line(&serde_json::to_string(&msg)?).await
    }

    async fn write_line(&self, line: &str) -> ScholarResult<()> {
        write_line(&self.stdin, line).await
    }

    /// Perform the MCP initialize handshake.
    async fn initialize(&self) -> ScholarResult<InitializeResult> {
        let params = serde_json::json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "scholar",
                "version": env!("CARGO_PKG_VERSION")
            }
        });

        let result = self.request("initialize", Some(params)).await?;
        serde_json::from_value(result).map_err(|e| {
            ScholarError::Protocol(format!("Failed to parse initialize result: {}", e))
        })
    }

    /// Fetch every page of a cursor-paginated listing.
    async fn list_paged<T: DeserializeOwned>(
        &self,
        method: &str,
        field: &str,
    ) -> ScholarResult<Vec<T>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor
                .take()
                .map(|c| serde_json::json!({ "cursor": c }));
            let mut result = self.request(method, params).await?;

            let page = result
                .get_mut(field)
                .map(serde_json::Value::take)
                .unwrap_or(serde_json::json!([]));
            let page: Vec<T> = serde_json::from_value(page).map_err(|e| {
                ScholarError::Protocol(format!("Failed to parse {} result: {}", method, e))
            })?;
            items.extend(page);

            match result.get("nextCursor").and_then(|c| c.as_str()) {
                Some(next) if !next.is_empty() => cursor = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(items)
    }

    fn require(&self, declared: bool, method: &str) -> ScholarResult<()> {
        if declared {
            Ok(())
        } else {
            Err(ScholarError::CapabilityUnsupported(format!(
                "{}: {}",
                self.server_name, method
            )))
        }
    }

    /// Get the server name.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Capabilities the server declared during the handshake.
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }
}

async fn write_line(stdin: &Mutex<ChildStdin>, line: &str) -> ScholarResult<()> {
    let mut stdin = stdin.lock().await;
    stdin.write_all(line.as_bytes()).await.map_err(|e| {
        ScholarError::ExecutionFailed(format!("Failed to write to MCP stdin: {}", e))
    })?;
    stdin
        .write_all(b"\n")
        .await
        .map_err(|e| ScholarError::ExecutionFailed(format!("Failed to write newline: {}", e)))?;
    stdin
        .flush()
        .await
        .map_err(|e| ScholarError::ExecutionFailed(format!("Failed to flush stdin: {}", e)))
}

/// Reader task: route responses to their waiting requests and answer
/// requests the server sends us.
async fn read_loop(
    mut reader: BufReader<ChildStdout>,
    stdin: Arc<Mutex<ChildStdin>>,
    pending: PendingMap,
    server_name: String,
) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!(server = %server_name, "MCP server stdout closed");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let message: serde_json::Value = match serde_json::from_str(trimmed) {
                    Ok(message) => message,
                    Err(e) => {
                        debug!(server = %server_name, line = %trimmed, error = %e, "Non-JSON-RPC line from MCP server");
                        continue;
                    }
                };

                if let Some(method) = message.get("method").and_then(|m| m.as_str()) {
                    // Server-to-client traffic shares the id space with our
                    // requests, so it must never reach the pending map.
                    if let Some(reply) = server_request_reply(method, &message) {
                        if let Err(e) = write_line(&stdin, &reply.to_string()).await {
                            warn!(server = %server_name, method, error = %e, "Failed to answer server request");
                        }
                    }
                    continue;
                }

                match serde_json::from_value::<JsonRpcResponse>(message) {
                    Ok(resp) => {
                        if let Some(id) = resp.id {
                            if let Some(tx) = pending.lock().await.remove(&id) {
                                let _ = tx.send(resp);
                            }
                        }
                    }
                    Err(e) => {
                        debug!(server = %server_name, line = %trimmed, error = %e, "Non-JSON-RPC line from MCP server");
                    }
                }
            }
            Err(e) => {
                error!(server = %server_name, error = %e, "Error reading MCP server stdout");
                break;
            }
        }
    }
    // Fail every request still waiting on this server.
    pending.lock().await.clear();
}

/// The reply owed to a server-initiated message, if any.
///
/// `ping` is answered with an empty result and any other request with
/// method-not-found. Notifications carry no id and get no reply.
fn server_request_reply(method: &str, message: &serde_json::Value) -> Option<serde_json::Value> {
    let id = message.get("id")?.clone();
    if method == "ping" {
        return Some(serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": {} }));
    }
    debug!(method, "Declining server request");
    Some(serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": METHOD_NOT_FOUND, "message": format!("Method not found: {method}") },
    }))
}

#[async_trait]
impl Backend for McpClient {
    fn name(&self) -> &str {
        &self.server_name
    }

    async fn list_tools(&self) -> ScholarResult<Vec<McpToolDef>> {
        self.list_paged("tools/list", "tools").await
    }

    async fn list_prompts(&self) -> ScholarResult<Vec<McpPromptDef>> {
        self.require(self.capabilities.prompts.is_some(), "prompts/list")?;
        self.list_paged("prompts/list", "prompts").await
    }

    async fn list_resources(&self) -> ScholarResult<Vec<McpResourceDef>> {
        self.require(self.capabilities.resources.is_some(), "resources/list")?;
        self.list_paged("resources/list", "resources").await
    }

    async fn list_resource_templates(&self) -> ScholarResult<Vec<McpResourceTemplate>> {
        self.require(
            self.capabilities.resources.is_some(),
            "resources/templates/list",
        )?;
        self.list_paged("resources/templates/list", "resourceTemplates")
            .await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> ScholarResult<serde_json::Value> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });

        let result = self.request("tools/call", Some(params)).await?;
        let tool_result: McpToolResult = serde_json::from_value(result)
            .map_err(|e| ScholarError::Protocol(format!("Failed to parse tool result: {}", e)))?;

        if tool_result.is_error {
            return Err(ScholarError::ExecutionFailed(tool_result.text()));
        }
        Ok(serde_json::Value::Array(tool_result.content))
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> ScholarResult<McpGetPromptResult> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });
        let result = self.request("prompts/get", Some(params)).await?;
        serde_json::from_value(result)
            .map_err(|e| ScholarError::Protocol(format!("Failed to parse prompt: {}", e)))
    }

    async fn read_resource(&self, uri: &str) -> ScholarResult<McpReadResourceResult> {
        let params = serde_json::json!({ "uri": uri });
        let result = self.request("resources/read", Some(params)).await?;
        serde_json::from_value(result)
            .map_err(|e| ScholarError::Protocol(format!("Failed to parse resource: {}", e)))
    }

    async fn shutdown(&self) {
        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            debug!(server = %self.server_name, error = %e, "MCP server already exited");
        } else {
            info!(server = %self.server_name, "MCP server stopped");
        }
    }
}
