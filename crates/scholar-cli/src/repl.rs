use scholar_agent::{
    normalize_resource_address, ConversationEngine, ConversationEvent, PromptRouter,
    PromptSummary, ResourceRouter, TurnReport,
};
use std::collections::HashMap;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

const USAGE: &str = "Usage: /prompt <name> <arg1=value1>";

/// One line of user input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Quit,
    Empty,
    ListPrompts,
    RunPrompt {
        name: String,
        arguments: HashMap<String, String>,
    },
    /// `/prompt` without a name.
    PromptUsage,
    ReadResource(String),
    Query(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if line.eq_ignore_ascii_case("quit") {
            return Self::Quit;
        }
        if line.starts_with("/prompts") {
            return Self::ListPrompts;
        }
        if line.starts_with("/prompt") {
            let mut tokens = line.split_whitespace().skip(1);
            let Some(name) = tokens.next() else {
                return Self::PromptUsage;
            };
            let arguments = tokens
                .filter_map(|t| t.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            return Self::RunPrompt {
                name: name.to_string(),
                arguments,
            };
        }
        if let Some(token) = line.strip_prefix('@') {
            return Self::ReadResource(normalize_resource_address(token));
        }
        Self::Query(line.to_string())
    }
}

/// Interactive chat loop over stdin/stdout.
pub struct Repl {
    engine: ConversationEngine,
    prompts: PromptRouter,
    resources: ResourceRouter,
}

impl Repl {
    pub fn new(engine: ConversationEngine, prompts: PromptRouter, resources: ResourceRouter) -> Self {
        Self {
            engine,
            prompts,
            resources,
        }
    }

    /// Read commands until `quit` or end of input.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        println!("\nScholar chat started.");
        println!("Type a query, '/prompts', or '/prompt <name> <arg1=value1>'. Type 'quit' to exit.");
        println!("Use @<resource> to read resources such as @folders or @<topic>.");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("\nQuery: ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let command = Command::parse(&line);
            debug!(?command, "REPL command");
            if command == Command::Quit {
                println!("Goodbye!");
                break;
            }
            self.execute(command).await;
        }
        Ok(())
    }

    /// Run one command. Failures are printed; the loop always continues.
    async fn execute(&mut self, command: Command) {
        match command {
            Command::Quit | Command::Empty => {}
            Command::PromptUsage => println!("{USAGE}"),
            Command::ListPrompts => print_prompts(&self.prompts.list_prompts().await),
            Command::RunPrompt { name, arguments } => {
                println!("\nExecuting prompt '{name}'...");
                match self
                    .prompts
                    .run_prompt(&mut self.engine, &name, &arguments)
                    .await
                {
                    Ok(report) => print_report(&report),
                    Err(e) => println!("Failed to execute prompt '{name}': {e}"),
                }
            }
            Command::ReadResource(uri) => match self.resources.read_resource(&uri).await {
                Ok(Some(text)) => println!("\nResource: {uri}\n\n{text}"),
                Ok(None) => println!("No content available."),
                Err(e) => println!("Failed to read resource '{uri}': {e}"),
            },
            Command::Query(query) => match self.engine.submit(&query).await {
                Ok(report) => print_report(&report),
                Err(e) => println!("Error: {e}"),
            },
        }
    }
}

fn print_report(report: &TurnReport) {
    for event in &report.events {
        match event {
            ConversationEvent::Text { text } => println!("\n{text}"),
            ConversationEvent::ToolCall { name, arguments } => {
                println!("\nCalling tool '{name}' with args: {arguments}");
            }
            ConversationEvent::ToolFailed { name, error } => {
                println!("Tool '{name}' failed: {error}");
            }
        }
    }
}

fn print_prompts(prompts: &[PromptSummary]) {
    if prompts.is_empty() {
        println!("\nNo prompts available.");
        return;
    }
    println!("\nAvailable prompts:");
    for prompt in prompts {
        println!(
            "  {}: {}",
            prompt.name,
            prompt.description.as_deref().unwrap_or("")
        );
        if !prompt.arguments.is_empty() {
            println!("    Arguments:");
            for arg in &prompt.arguments {
                println!("      - {arg}");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_is_case_insensitive() {
        assert_eq!(Command::parse("quit"), Command::Quit);
        assert_eq!(Command::parse("  QUIT "), Command::Quit);
        assert_eq!(Command::parse("quit now"), Command::Query("quit now".into()));
    }

    #[test]
    fn test_prompt_commands() {
        assert_eq!(Command::parse("/prompts"), Command::ListPrompts);
        assert_eq!(Command::parse("/prompt"), Command::PromptUsage);

        let Command::RunPrompt { name, arguments } =
            Command::parse("/prompt generate_search_prompt topic=quantum num_papers=5 stray")
        else {
            panic!("expected a prompt command");
        };
        assert_eq!(name, "generate_search_prompt");
        assert_eq!(arguments.len(), 2);
        assert_eq!(arguments["topic"], "quantum");
        assert_eq!(arguments["num_papers"], "5");
    }

    #[test]
    fn test_prompt_argument_value_may_contain_equals() {
        let Command::RunPrompt { arguments, .. } = Command::parse("/prompt p filter=a=b") else {
            panic!("expected a prompt command");
        };
        assert_eq!(arguments["filter"], "a=b");
    }

    #[test]
    fn test_resource_tokens() {
        assert_eq!(
            Command::parse("@folders"),
            Command::ReadResource("papers://folders".into())
        );
        assert_eq!(
            Command::parse("@Machine Learning"),
            Command::ReadResource("papers://machine_learning".into())
        );
        assert_eq!(
            Command::parse("@papers://physics"),
            Command::ReadResource("papers://physics".into())
        );
    }

    #[test]
    fn test_everything_else_is_a_query() {
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(
            Command::parse("Find papers on diffusion models"),
            Command::Query("Find papers on diffusion models".into())
        );
    }
}
