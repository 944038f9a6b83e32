use crate::events::{ConversationEvent, TurnReport};
use crate::llm::LlmClient;
use scholar_core::{Message, Part, Role, ScholarResult, ToolDeclaration};
use scholar_mcp::ToolDispatcher;
use tracing::{debug, error, info, warn};

/// Where the engine is in processing a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    AwaitingUserInput,
    ModelTurn,
    Dispatching,
    /// The last query finished; the next `submit` starts a new one.
    Done,
}

/// The conversation history and the tool set offered to the model.
///
/// History is append-only and replayed in full on every model turn.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
    tools: Vec<ToolDeclaration>,
}

impl ConversationState {
    pub fn new(tools: Vec<ToolDeclaration>) -> Self {
        Self {
            messages: Vec::new(),
            tools,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn tools(&self) -> &[ToolDeclaration] {
        &self.tools
    }

    fn push(&mut self, message: Message) {
        debug!(
            id = %message.id,
            at = %message.timestamp,
            role = ?message.role,
            parts = message.parts.len(),
            "Appending message"
        );
        self.messages.push(message);
    }
}

/// Drives the send, inspect, dispatch, append loop for one conversation.
///
/// Loops until the model answers without requesting a tool. There is no turn
/// limit; a failing tool call is reported and skipped, never fatal.
pub struct ConversationEngine {
    llm: LlmClient,
    dispatcher: ToolDispatcher,
    state: ConversationState,
    phase: EngineState,
    system_instruction: Option<String>,
}

impl ConversationEngine {
    pub fn new(llm: LlmClient, dispatcher: ToolDispatcher, tools: Vec<ToolDeclaration>) -> Self {
        Self {
            llm,
            dispatcher,
            state: ConversationState::new(tools),
            phase: EngineState::AwaitingUserInput,
            system_instruction: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn history(&self) -> &[Message] {
        self.state.messages()
    }

    pub fn phase(&self) -> EngineState {
        self.phase
    }

    /// Process one user query through as many model turns as it takes.
    ///
    /// An empty `query` appends nothing and simply asks the model to continue.
    /// A model endpoint failure aborts this query only: the error is returned,
    /// the history is left as it was, and the engine accepts the next query.
    pub async fn submit(&mut self, query: &str) -> ScholarResult<TurnReport> {
        if !query.is_empty() {
            self.state.push(Message::user_text(query));
        }

        let mut report = TurnReport::default();
        loop {
            self.phase = EngineState::ModelTurn;
            report.turns += 1;
            debug!(
                turn = report.turns,
                history = self.state.messages.len(),
                "Model turn"
            );

            let response = match self
                .llm
                .generate(
                    self.system_instruction.as_deref(),
                    &self.state.messages,
                    &self.state.tools,
                )
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    error!(turn = report.turns, error = %e, "Model turn failed");
                    self.phase = EngineState::AwaitingUserInput;
                    return Err(e);
                }
            };

            let (calls, content): (Vec<Part>, Vec<Part>) = response
                .into_first_parts()
                .into_iter()
                .partition(Part::is_function_call);

            for part in &content {
                if let Some(text) = part.as_text() {
                    report.events.push(ConversationEvent::Text {
                        text: text.to_string(),
                    });
                }
            }

            if calls.is_empty() {
                if !content.is_empty() {
                    self.state.push(Message::model(content));
                }
                self.phase = EngineState::Done;
                info!(turns = report.turns, "Query complete");
                return Ok(report);
            }

            self.phase = EngineState::Dispatching;
            self.dispatch(calls, &mut report).await;
        }
    }

    /// Run each requested call in order, appending call and result on success.
    async fn dispatch(&mut self, calls: Vec<Part>, report: &mut TurnReport) {
        for call in calls {
            let Part::FunctionCall { name, args, .. } = &call else {
                continue;
            };
            let name = name.clone();
            report.events.push(ConversationEvent::ToolCall {
                name: name.clone(),
                arguments: serde_json::Value::Object(args.clone()),
            });

            match self.dispatcher.invoke(&name, args.clone()).await {
                Ok(content) => {
                    // The model's own call part, thought signature included.
                    self.state.push(Message::model(vec![call]));
                    self.state.push(Message::new(
                        Role::User,
                        vec![Part::function_response(name, content)],
                    ));
                }
                Err(e) => {
                    warn!(tool = %name, error = %e, "Tool call failed, continuing");
                    report.events.push(ConversationEvent::ToolFailed {
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::backends::{LlmBackend, ModelResponse};
    use async_trait::async_trait;
    use scholar_core::ScholarError;
    use scholar_mcp::CapabilityRegistry;
    use std::sync::{Arc, Mutex};

    /// Replays a fixed list of responses, one per call.
    struct Scripted(Mutex<Vec<ScholarResult<ModelResponse>>>);

    #[async_trait]
    impl LlmBackend for Scripted {
        async fn generate(
            &self,
            _system_instruction: Option<&str>,
            _messages: &[Message],
            _tools: &[ToolDeclaration],
        ) -> ScholarResult<ModelResponse> {
            let mut script = self.0.lock().unwrap();
            if script.is_empty() {
                return Ok(ModelResponse::single(vec![Part::text("(script exhausted)")]));
            }
            script.remove(0)
        }
    }

    fn engine(script: Vec<ScholarResult<ModelResponse>>) -> ConversationEngine {
        let llm = LlmClient::from_backend(Box::new(Scripted(Mutex::new(script))));
        let dispatcher = ToolDispatcher::new(Arc::new(CapabilityRegistry::new()));
        ConversationEngine::new(llm, dispatcher, vec![])
    }

    #[tokio::test]
    async fn test_text_only_reply_ends_query() {
        let mut engine = engine(vec![Ok(ModelResponse::single(vec![Part::text("Hi!")]))]);
        assert_eq!(engine.phase(), EngineState::AwaitingUserInput);

        let report = engine.submit("hello").await.unwrap();

        assert_eq!(report.turns, 1);
        assert_eq!(report.text(), "Hi!");
        assert_eq!(engine.phase(), EngineState::Done);
        assert_eq!(engine.history().len(), 2);
        assert_eq!(engine.history()[1].role, Role::Model);
    }

    #[tokio::test]
    async fn test_empty_query_appends_nothing() {
        let mut engine = engine(vec![Ok(ModelResponse::single(vec![]))]);
        let report = engine.submit("").await.unwrap();
        assert!(report.events.is_empty());
        assert!(engine.history().is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_returns_to_awaiting_input() {
        let mut engine = engine(vec![
            Err(ScholarError::GenerationFailed("quota exceeded".into())),
            Ok(ModelResponse::single(vec![Part::text("Back again.")])),
        ]);

        let err = engine.submit("first").await.unwrap_err();
        assert!(matches!(err, ScholarError::GenerationFailed(_)));
        assert_eq!(engine.phase(), EngineState::AwaitingUserInput);
        assert_eq!(engine.history().len(), 1);

        let report = engine.submit("second").await.unwrap();
        assert_eq!(report.text(), "Back again.");
        assert_eq!(engine.history().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_not_appended() {
        let mut engine = engine(vec![
            Ok(ModelResponse::single(vec![Part::function_call(
                "missing_tool",
                serde_json::Map::new(),
            )])),
            Ok(ModelResponse::single(vec![Part::text("I could not do that.")])),
        ]);

        let report = engine.submit("do it").await.unwrap();

        assert_eq!(report.turns, 2);
        assert_eq!(report.failed_tools(), vec!["missing_tool"]);
        let roles: Vec<Role> = engine.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Model]);
    }
}
