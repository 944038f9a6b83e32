mod config;
mod repl;

use clap::{Parser, Subcommand};
use config::{load_servers, ScholarConfig, API_KEY_ENV};
use repl::Repl;
use scholar_agent::{ConversationEngine, LlmClient, PromptRouter, ResourceRouter};
use scholar_core::CapabilityKind;
use scholar_mcp::{CapabilityRegistry, McpServerManager, SetupReport, ToolDispatcher};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scholar", about = "Scholar: research chat over MCP tool servers")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "scholar.toml")]
    config: PathBuf,

    /// MCP server definitions (overrides `servers_file` from the config)
    #[arg(short, long)]
    servers: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Start the interactive chat (default)
    Chat,
    /// Connect to the configured servers and list what they provide
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    let config = ScholarConfig::load(&cli.config)?;
    let command = cli.command.unwrap_or(Commands::Chat);
    check_api_key(command, &config)?;

    let servers_path = cli.servers.clone().unwrap_or_else(|| config.servers_file.clone());
    let servers = load_servers(&servers_path);
    if servers.is_empty() {
        println!("No server configurations found. Exiting.");
        return Ok(());
    }

    let mut manager = McpServerManager::new();
    let mut registry = CapabilityRegistry::new();
    for server in &servers {
        println!("Connecting to {} server...", server.name);
    }
    let report = manager.connect_all(&servers, &mut registry).await;
    print_setup(&report);

    let outcome = if report.has_tools() {
        run(command, config, Arc::new(registry)).await
    } else {
        println!("No tools available. Exiting.");
        Ok(())
    };

    manager.shutdown().await;
    outcome
}

async fn run(
    command: Commands,
    config: ScholarConfig,
    registry: Arc<CapabilityRegistry>,
) -> anyhow::Result<()> {
    match command {
        Commands::Tools => {
            print_capabilities(&registry);
            Ok(())
        }
        Commands::Chat => {
            info!(model = %config.model.model_id, "Starting chat");

            let mut engine = ConversationEngine::new(
                LlmClient::new(config.model),
                ToolDispatcher::new(registry.clone()),
                registry.tool_declarations(),
            );
            if let Some(instruction) = config.system_instruction {
                engine = engine.with_system_instruction(instruction);
            }

            let mut repl = Repl::new(
                engine,
                PromptRouter::new(registry.clone()),
                ResourceRouter::new(registry),
            );
            repl.run().await
        }
    }
}

/// Chat needs a model key; fail before any server process is started.
fn check_api_key(command: Commands, config: &ScholarConfig) -> anyhow::Result<()> {
    if matches!(command, Commands::Chat) && config.model.api_key.is_none() {
        anyhow::bail!("No Gemini API key: set {API_KEY_ENV} or model.api_key in the config file");
    }
    Ok(())
}

fn print_setup(report: &SetupReport) {
    for server in &report.connected {
        println!("Connected to {server}");
    }
    for failure in &report.failures {
        warn!(error = %failure, "Server unavailable");
        println!("{failure}");
    }
    println!(
        "\nTotal tools available: {} ({} prompts, {} resources)",
        report.tool_count, report.prompt_count, report.resource_count
    );
}

fn print_capabilities(registry: &CapabilityRegistry) {
    for (kind, heading) in [
        (CapabilityKind::Tool, "Tools"),
        (CapabilityKind::Prompt, "Prompts"),
        (CapabilityKind::Resource, "Resources"),
    ] {
        let records = registry.records(kind);
        if records.is_empty() {
            continue;
        }
        println!("\n{heading}:");
        for record in records {
            println!("  {} [{}]", record.identifier, record.backend.name());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_without_key_is_rejected() {
        let config = ScholarConfig::default();
        let err = check_api_key(Commands::Chat, &config).unwrap_err();
        assert!(err.to_string().contains(API_KEY_ENV));
    }

    #[test]
    fn test_tools_listing_needs_no_key() {
        assert!(check_api_key(Commands::Tools, &ScholarConfig::default()).is_ok());
    }

    #[test]
    fn test_chat_with_key_is_accepted() {
        let mut config = ScholarConfig::default();
        config.model.api_key = Some("test-key".into());
        assert!(check_api_key(Commands::Chat, &config).is_ok());
    }
}
