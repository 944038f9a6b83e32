use serde::{Deserialize, Serialize};

/// Observable events produced while the engine processes one query.
///
/// The engine never prints; callers (the CLI) render these in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// Text produced by the model.
    Text { text: String },

    /// The model asked for a tool; emitted before dispatch.
    ToolCall {
        name: String,
        arguments: serde_json::Value,
    },

    /// A single tool call failed. The conversation carries on.
    ToolFailed { name: String, error: String },
}

/// Outcome of one `submit`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnReport {
    /// Events in the order they happened.
    pub events: Vec<ConversationEvent>,
    /// Round trips made to the model endpoint.
    pub turns: usize,
}

impl TurnReport {
    /// All model text of this query, joined with newlines.
    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                ConversationEvent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Names of every tool that failed, in order.
    pub fn failed_tools(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ConversationEvent::ToolFailed { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}
