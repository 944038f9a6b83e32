use crate::backends::gemini::GeminiBackend;
use crate::backends::{LlmBackend, ModelResponse};
use crate::config::ModelConfig;
use scholar_core::{Message, ScholarResult, ToolDeclaration};

/// Model endpoint client.
///
/// Uses the `LlmBackend` trait to keep the conversation loop independent of
/// the provider's wire format.
pub struct LlmClient {
    backend: Box<dyn LlmBackend>,
}

impl LlmClient {
    /// Client for the Gemini endpoint described by `config`.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            backend: Box::new(GeminiBackend::new(config)),
        }
    }

    /// Create from a pre-built backend (for custom providers and tests).
    pub fn from_backend(backend: Box<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    pub async fn generate(
        &self,
        system_instruction: Option<&str>,
        messages: &[Message],
        tools: &[ToolDeclaration],
    ) -> ScholarResult<ModelResponse> {
        self.backend
            .generate(system_instruction, messages, tools)
            .await
    }
}
