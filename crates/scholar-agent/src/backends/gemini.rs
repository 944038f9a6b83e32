use super::{Candidate, LlmBackend, ModelResponse};
use crate::config::ModelConfig;
use async_trait::async_trait;
use scholar_core::{Message, Part, Role, ScholarError, ScholarResult, ToolDeclaration};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

/// Google Gemini `generateContent` backend.
pub struct GeminiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url(),
            self.config.model_id
        )
    }

    fn build_request(
        &self,
        system_instruction: Option<&str>,
        messages: &[Message],
        tools: &[ToolDeclaration],
    ) -> GeminiRequest {
        let tools = if tools.is_empty() {
            None
        } else {
            Some(vec![GeminiTool {
                function_declarations: tools
                    .iter()
                    .map(|t| GeminiFunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    })
                    .collect(),
            }])
        };

        GeminiRequest {
            contents: messages.iter().map(to_content).collect(),
            system_instruction: system_instruction.map(|text| GeminiSystemInstruction {
                parts: vec![GeminiPart::Text {
                    text: text.to_string(),
                }],
            }),
            tools,
            generation_config: GeminiGenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn generate(
        &self,
        system_instruction: Option<&str>,
        messages: &[Message],
        tools: &[ToolDeclaration],
    ) -> ScholarResult<ModelResponse> {
        let request = self.build_request(system_instruction, messages, tools);
        debug!(
            model = %self.config.model_id,
            messages = messages.len(),
            tools = tools.len(),
            "Sending generateContent request"
        );

        let mut builder = self.http.post(self.endpoint()).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.query(&[("key", key)]);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| ScholarError::GenerationFailed(format!("Gemini request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ScholarError::GenerationFailed(format!("Gemini response unreadable: {e}")))?;

        if !status.is_success() {
            error!(status = %status, body = %body, "Gemini API error response");
            return Err(ScholarError::GenerationFailed(format!(
                "Gemini API error {status}: {body}"
            )));
        }

        let parsed: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            ScholarError::GenerationFailed(format!("Failed to parse Gemini response: {e}"))
        })?;
        convert_response(parsed)
    }
}

fn to_content(message: &Message) -> GeminiContent {
    GeminiContent {
        role: match message.role {
            Role::User => "user",
            Role::Model => "model",
        }
        .to_string(),
        parts: message.parts.iter().map(to_gemini_part).collect(),
    }
}

fn to_gemini_part(part: &Part) -> GeminiPart {
    match part {
        Part::Text { text } => GeminiPart::Text { text: text.clone() },
        Part::FunctionCall {
            name,
            args,
            thought_signature,
        } => GeminiPart::FunctionCall {
            function_call: GeminiFunctionCall {
                name: name.clone(),
                args: args.clone(),
            },
            thought_signature: thought_signature.clone(),
        },
        Part::FunctionResponse { name, response } => GeminiPart::FunctionResponse {
            function_response: GeminiFunctionResponse {
                name: name.clone(),
                response: response.clone(),
            },
        },
    }
}

fn convert_response(response: GeminiResponse) -> ScholarResult<ModelResponse> {
    if response.candidates.is_empty() {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(ScholarError::GenerationFailed(format!(
            "Gemini returned no candidates: {reason}"
        )));
    }

    let candidates = response
        .candidates
        .into_iter()
        .map(|candidate| Candidate {
            parts: candidate
                .content
                .map(|c| c.parts)
                .unwrap_or_default()
                .into_iter()
                .filter_map(from_gemini_part)
                .collect(),
        })
        .collect();

    Ok(ModelResponse { candidates })
}

fn from_gemini_part(part: GeminiPart) -> Option<Part> {
    match part {
        GeminiPart::Text { text } => Some(Part::Text { text }),
        GeminiPart::FunctionCall {
            function_call,
            thought_signature,
        } => Some(Part::FunctionCall {
            name: function_call.name,
            args: function_call.args,
            thought_signature,
        }),
        GeminiPart::FunctionResponse { function_response } => {
            warn!(name = %function_response.name, "Unexpected functionResponse in model output");
            None
        }
        GeminiPart::Other(value) => {
            debug!(part = %value, "Skipping unsupported Gemini part");
            None
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

// Variant order matters: untagged deserialization takes the first match.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
        #[serde(
            default,
            rename = "thoughtSignature",
            skip_serializing_if = "Option::is_none"
        )]
        thought_signature: Option<String>,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
    Text {
        text: String,
    },
    Other(Value),
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct GeminiTool {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default, rename = "promptFeedback")]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiPromptFeedback {
    #[serde(default, rename = "blockReason")]
    block_reason: Option<String>,
}
