pub mod gemini;

use async_trait::async_trait;
use scholar_core::{Message, Part, ScholarResult, ToolDeclaration};

/// One candidate answer from the model endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    pub parts: Vec<Part>,
}

/// Everything the model endpoint returned for one turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub candidates: Vec<Candidate>,
}

impl ModelResponse {
    /// A response with a single candidate.
    pub fn single(parts: Vec<Part>) -> Self {
        Self {
            candidates: vec![Candidate { parts }],
        }
    }

    /// Parts of the first candidate; the conversation only follows that one.
    pub fn into_first_parts(self) -> Vec<Part> {
        self.candidates
            .into_iter()
            .next()
            .map(|c| c.parts)
            .unwrap_or_default()
    }
}

/// Trait for model endpoint backends.
///
/// To add a new provider, implement `LlmBackend` in `backends/` and hand it
/// to [`crate::llm::LlmClient::from_backend`].
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Send the full history and the declared tool set; return the model's candidates.
    ///
    /// Any transport or endpoint fault is reported as
    /// [`scholar_core::ScholarError::GenerationFailed`].
    async fn generate(
        &self,
        system_instruction: Option<&str>,
        messages: &[Message],
        tools: &[ToolDeclaration],
    ) -> ScholarResult<ModelResponse>;
}
