use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The role of the participant that authored a [`Message`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human end-user. Tool results are also delivered under this role.
    User,
    /// The model endpoint.
    Model,
}

/// One piece of a [`Message`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// A request from the model to invoke a tool.
    FunctionCall {
        /// Name of the requested tool.
        name: String,
        /// Arguments keyed by parameter name.
        #[serde(default)]
        args: Map<String, Value>,
        /// Opaque signature the model attached to the call. Must be replayed
        /// unchanged with the call in later turns.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thought_signature: Option<String>,
    },
    /// The normalized result of a tool invocation.
    FunctionResponse {
        /// Name of the tool that produced the result.
        name: String,
        /// Keyed result content.
        response: Map<String, Value>,
    },
}

impl Part {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates a function-call part.
    pub fn function_call(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self::FunctionCall {
            name: name.into(),
            args,
            thought_signature: None,
        }
    }

    /// Attaches a thought signature to a function-call part. Other parts are
    /// returned unchanged.
    pub fn with_thought_signature(mut self, signature: impl Into<String>) -> Self {
        if let Self::FunctionCall {
            thought_signature, ..
        } = &mut self
        {
            *thought_signature = Some(signature.into());
        }
        self
    }

    /// Creates a function-response part.
    pub fn function_response(name: impl Into<String>, response: Map<String, Value>) -> Self {
        Self::FunctionResponse {
            name: name.into(),
            response,
        }
    }

    /// Whether this part asks for a tool invocation.
    pub fn is_function_call(&self) -> bool {
        matches!(self, Self::FunctionCall { .. })
    }

    /// The text content, if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A single turn of the conversation.
///
/// History is append-only and replayed to the model endpoint in order on
/// every turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message.
    pub id: Uuid,
    /// The role of the message author.
    pub role: Role,
    /// Ordered content parts.
    pub parts: Vec<Part>,
    /// UTC timestamp of when the message was created.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a new message with the given role and parts.
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            parts,
            timestamp: Utc::now(),
        }
    }

    /// Creates a user message holding a single text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    /// Creates a model message with the given parts.
    pub fn model(parts: Vec<Part>) -> Self {
        Self::new(Role::Model, parts)
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

/// A tool as advertised to the model endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDeclaration {
    /// Tool name, unique across all backends.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Sanitized parameter schema.
    pub parameters: Value,
}
