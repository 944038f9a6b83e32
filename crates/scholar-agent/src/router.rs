//! Prompt and resource routing.
//!
//! Both routers resolve an identifier through the shared
//! [`CapabilityRegistry`] and forward the request to the owning backend.

use crate::engine::ConversationEngine;
use crate::events::TurnReport;
use scholar_core::{CapabilityKind, ScholarError, ScholarResult};
use scholar_mcp::CapabilityRegistry;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Scheme used for bare resource tokens.
pub const DEFAULT_RESOURCE_SCHEME: &str = "papers://";

/// A prompt as listed to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptSummary {
    pub name: String,
    pub description: Option<String>,
    pub arguments: Vec<String>,
}

pub struct PromptRouter {
    registry: Arc<CapabilityRegistry>,
}

impl PromptRouter {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    /// Ask every connected backend for its prompts.
    ///
    /// Names are deduplicated across backends, first seen wins. A backend
    /// that cannot list prompts contributes nothing.
    pub async fn list_prompts(&self) -> Vec<PromptSummary> {
        let mut seen = HashSet::new();
        let mut summaries = Vec::new();

        for handle in self.registry.backends() {
            let backend = match handle.upgrade() {
                Ok(backend) => backend,
                Err(e) => {
                    debug!(server = %handle.name(), error = %e, "Skipping released backend");
                    continue;
                }
            };
            let prompts = match backend.list_prompts().await {
                Ok(prompts) => prompts,
                Err(e) if e.is_unsupported() => continue,
                Err(e) => {
                    warn!(server = %handle.name(), error = %e, "Could not list prompts");
                    continue;
                }
            };
            for prompt in prompts {
                if seen.insert(prompt.name.clone()) {
                    summaries.push(PromptSummary {
                        name: prompt.name,
                        description: prompt.description,
                        arguments: prompt.arguments.into_iter().map(|a| a.name).collect(),
                    });
                }
            }
        }

        summaries
    }

    /// Expand a prompt into text on its owning backend.
    pub async fn render_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> ScholarResult<String> {
        let record = self
            .registry
            .resolve(CapabilityKind::Prompt, name)
            .ok_or_else(|| ScholarError::not_found(CapabilityKind::Prompt, name))?;

        let backend = record.backend.upgrade()?;
        let rendered = backend
            .get_prompt(name, arguments)
            .await
            .map_err(|e| ScholarError::ExecutionFailed(format!("prompt '{name}': {e}")))?;

        rendered
            .messages
            .first()
            .map(|m| m.text())
            .ok_or_else(|| {
                ScholarError::ExecutionFailed(format!("prompt '{name}' rendered no messages"))
            })
    }

    /// Expand a prompt, then converse with the result as a fresh user query.
    pub async fn run_prompt(
        &self,
        engine: &mut ConversationEngine,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> ScholarResult<TurnReport> {
        let text = self.render_prompt(name, arguments).await?;
        info!(prompt = %name, "Executing prompt");
        engine.submit(&text).await
    }
}

pub struct ResourceRouter {
    registry: Arc<CapabilityRegistry>,
}

impl ResourceRouter {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    /// Read a resource, resolving parameterized addresses by scheme prefix.
    ///
    /// Returns the text of the first content item, or `None` when the backend
    /// returned no content.
    pub async fn read_resource(&self, uri: &str) -> ScholarResult<Option<String>> {
        let record = self
            .registry
            .resolve(CapabilityKind::Resource, uri)
            .ok_or_else(|| ScholarError::not_found(CapabilityKind::Resource, uri))?;

        debug!(uri = %uri, registered = %record.identifier, server = %record.backend.name(), "Reading resource");
        let backend = record.backend.upgrade()?;
        let result = backend
            .read_resource(uri)
            .await
            .map_err(|e| ScholarError::ExecutionFailed(format!("resource '{uri}': {e}")))?;

        Ok(result
            .contents
            .into_iter()
            .next()
            .map(|item| item.text.unwrap_or_default()))
    }
}

/// Turn a user-typed resource token into a full address.
///
/// `folders` maps to the folder index, anything already carrying a scheme is
/// kept, and a bare topic becomes `papers://<topic>` lowercased with spaces
/// replaced by underscores.
pub fn normalize_resource_address(token: &str) -> String {
    let token = token.trim();
    if token == "folders" {
        format!("{DEFAULT_RESOURCE_SCHEME}folders")
    } else if token.contains("://") {
        token.to_string()
    } else {
        format!(
            "{DEFAULT_RESOURCE_SCHEME}{}",
            token.to_lowercase().replace(' ', "_")
        )
    }
}
