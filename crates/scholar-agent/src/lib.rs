//! Model endpoint and conversation loop for Scholar.
//!
//! [`ConversationEngine`] sends the conversation to the model through an
//! [`LlmClient`], dispatches requested tool calls through scholar-mcp, and
//! feeds the results back until the model stops asking for tools.
//! [`PromptRouter`] and [`ResourceRouter`] serve the user-facing `/prompt`
//! and `@resource` commands.

pub mod backends;
pub mod config;
pub mod engine;
pub mod events;
pub mod llm;
pub mod router;

pub use backends::gemini::GeminiBackend;
pub use backends::{Candidate, LlmBackend, ModelResponse};
pub use config::ModelConfig;
pub use engine::{ConversationEngine, ConversationState, EngineState};
pub use events::{ConversationEvent, TurnReport};
pub use llm::LlmClient;
pub use router::{normalize_resource_address, PromptRouter, PromptSummary, ResourceRouter};
