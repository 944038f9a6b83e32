use anyhow::Context;
use scholar_agent::ModelConfig;
use scholar_mcp::{parse_server_definitions, ServerDefinition};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable consulted when the config carries no API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Contents of `scholar.toml`.
#[derive(Debug, Deserialize)]
pub struct ScholarConfig {
    #[serde(default)]
    pub model: ModelConfig,
    /// MCP server definitions, relative to the config file's directory.
    #[serde(default = "default_servers_file")]
    pub servers_file: PathBuf,
    #[serde(default)]
    pub system_instruction: Option<String>,
}

fn default_servers_file() -> PathBuf {
    PathBuf::from("server_config.json")
}

impl Default for ScholarConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            servers_file: default_servers_file(),
            system_instruction: None,
        }
    }
}

impl ScholarConfig {
    /// Load the app config. A missing file means defaults; a malformed one is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
            let mut config: ScholarConfig = toml::from_str(&raw)
                .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
            if config.servers_file.is_relative() {
                if let Some(dir) = path.parent() {
                    config.servers_file = dir.join(&config.servers_file);
                }
            }
            config
        } else {
            info!(path = %path.display(), "No config file, using defaults");
            ScholarConfig::default()
        };

        if config.model.api_key.is_none() {
            config.model.api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
        }
        Ok(config)
    }
}

/// Read the MCP server definitions.
///
/// A missing or malformed file is logged and yields no servers.
pub fn load_servers(path: &Path) -> Vec<ServerDefinition> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read server config");
            return Vec::new();
        }
    };
    match parse_server_definitions(&raw) {
        Ok(servers) => servers,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to parse server config");
            Vec::new()
        }
    }
}
