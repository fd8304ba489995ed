use crate::conversation::Conversation;
use crate::provider::{LlmError, OracleReply, ToolAwareLlmProvider};
use crate::registry::ToolRegistry;
use crate::tool::ToolCall;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where a single user turn is in its LLM ↔ tool exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    /// User text received, not yet recorded.
    AwaitingUser(String),
    /// Waiting on the LLM's next reply.
    OraclePending,
    /// The LLM asked for these tools; dispatch them in order.
    ToolPending(Vec<ToolCall>),
    /// The LLM answered in plain text.
    Done(String),
}

/// Summary of one completed user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    /// The LLM's final text, unchanged.
    pub answer: String,
    /// LLM replies that requested tools.
    pub tool_rounds: usize,
    /// Individual tool calls dispatched.
    pub dispatches: usize,
}

/// The core agentic loop that orchestrates LLM ↔ Tool execution.
///
/// Flow: User → LLM → ToolCalls → Execute → Results → LLM → ... → Final Text
///
/// Tool calls are dispatched one at a time, in the order requested, and each
/// result is recorded before the next dispatch.
pub struct AgenticLoop {
    provider: Arc<dyn ToolAwareLlmProvider>,
    registry: Arc<ToolRegistry>,
    max_iterations: usize,
    temperature: f32,
    max_tokens: u32,
    oracle_timeout: Option<Duration>,
}

impl AgenticLoop {
    pub fn new(provider: Arc<dyn ToolAwareLlmProvider>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            registry,
            max_iterations: 10,
            temperature: 0.0,
            max_tokens: 4096,
            oracle_timeout: None,
        }
    }

    /// Maximum number of tool rounds per user turn.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run a single user turn through the agentic loop and return the
    /// LLM's final answer.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        user_message: String,
    ) -> Result<LoopOutcome, AgenticLoopError> {
        let mut state = LoopState::AwaitingUser(user_message);
        let mut tool_rounds = 0usize;
        let mut dispatches = 0usize;

        loop {
            state = match state {
                LoopState::AwaitingUser(text) => {
                    conversation.add_user_message(text);
                    LoopState::OraclePending
                }
                LoopState::OraclePending => {
                    debug!(tool_rounds, session = %conversation.session(), "asking LLM");
                    match self.ask_oracle(conversation).await? {
                        OracleReply::Text(text) => {
                            conversation.add_oracle_text(text.clone());
                            LoopState::Done(text)
                        }
                        OracleReply::ToolCalls(calls) if calls.is_empty() => {
                            warn!("LLM sent an empty tool request, treating as empty answer");
                            conversation.add_oracle_text(String::new());
                            LoopState::Done(String::new())
                        }
                        OracleReply::ToolCalls(calls) => {
                            if tool_rounds >= self.max_iterations {
                                warn!(
                                    max_iterations = self.max_iterations,
                                    "LLM kept requesting tools, giving up"
                                );
                                return Err(AgenticLoopError::ToolLoopExceeded(
                                    self.max_iterations,
                                ));
                            }
                            tool_rounds += 1;
                            for call in &calls {
                                conversation.add_tool_request(call.clone());
                            }
                            LoopState::ToolPending(calls)
                        }
                    }
                }
                LoopState::ToolPending(calls) => {
                    info!(count = calls.len(), round = tool_rounds, "Executing tool calls");
                    for call in &calls {
                        let result = self.registry.dispatch(call).await;
                        dispatches += 1;
                        conversation.add_tool_result(result);
                    }
                    LoopState::OraclePending
                }
                LoopState::Done(answer) => {
                    info!(tool_rounds, dispatches, "Agentic loop complete");
                    return Ok(LoopOutcome {
                        answer,
                        tool_rounds,
                        dispatches,
                    });
                }
            };
        }
    }

    /// One LLM round trip. A failure is recorded as a turn before being
    /// returned, so the history shows why the exchange stopped.
    async fn ask_oracle(
        &self,
        conversation: &mut Conversation,
    ) -> Result<OracleReply, AgenticLoopError> {
        let tools = self.registry.definitions();
        let request = self.provider.respond(
            conversation,
            &tools,
            self.temperature,
            self.max_tokens,
        );
        let reply = match self.oracle_timeout {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(reply) => reply,
                Err(_) => Err(LlmError::Timeout(limit)),
            },
            None => request.await,
        };

        match reply {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!(provider = self.provider.provider_name(), error = %e, "LLM call failed");
                conversation.add_oracle_failure(e.to_string());
                Err(AgenticLoopError::Oracle(e))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgenticLoopError {
    #[error("LLM error: {0}")]
    Oracle(#[from] LlmError),
    #[error("tool loop exceeded: LLM still requesting tools after {0} rounds")]
    ToolLoopExceeded(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Turn;
    use crate::provider::mock::MockLlmProvider;
    use crate::tool::{EchoTool, ToolPayload};
    use serde_json::json;

    fn setup_test_loop() -> (AgenticLoop, Arc<MockLlmProvider>) {
        let provider = Arc::new(MockLlmProvider::new());
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();

        let agentic_loop = AgenticLoop::new(
            provider.clone() as Arc<dyn ToolAwareLlmProvider>,
            Arc::new(registry),
        );

        (agentic_loop, provider)
    }

    fn echo_call(id: &str, message: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "echo".to_string(),
            input: json!({"message": message}),
        }
    }

    #[tokio::test]
    async fn test_simple_text_response() {
        let (agentic_loop, provider) = setup_test_loop();
        provider.queue_text("Hello, I'm your analyst.");

        let mut conv = Conversation::new();
        let outcome = agentic_loop.run(&mut conv, "Hello".to_string()).await.unwrap();

        assert_eq!(outcome.answer, "Hello, I'm your analyst.");
        assert_eq!(outcome.dispatches, 0);
        assert_eq!(conv.len(), 2);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_tool_call_and_response() {
        let (agentic_loop, provider) = setup_test_loop();
        provider.queue_tool_call("echo", json!({"message": "test"}));
        provider.queue_text("Done!");

        let mut conv = Conversation::new();
        let outcome = agentic_loop
            .run(&mut conv, "Echo test".to_string())
            .await
            .unwrap();

        assert_eq!(outcome.answer, "Done!");
        assert_eq!(outcome.tool_rounds, 1);
        assert_eq!(outcome.dispatches, 1);
        // user, tool request, tool result, text
        assert_eq!(conv.len(), 4);
        // The second LLM call saw the tool result.
        assert_eq!(provider.seen_turns(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_multiple_calls_dispatched_in_request_order() {
        let (agentic_loop, provider) = setup_test_loop();
        provider.queue_reply(OracleReply::ToolCalls(vec![
            echo_call("a", "first"),
            echo_call("b", "second"),
        ]));
        provider.queue_text("both done");

        let mut conv = Conversation::new();
        let outcome = agentic_loop.run(&mut conv, "go".to_string()).await.unwrap();
        assert_eq!(outcome.dispatches, 2);

        let kinds: Vec<&Turn> = conv.turns().collect();
        assert!(matches!(kinds[1], Turn::OracleToolRequest(c) if c.id == "a"));
        assert!(matches!(kinds[2], Turn::OracleToolRequest(c) if c.id == "b"));
        let results: Vec<_> = conv.tool_results().collect();
        assert_eq!(results[0].tool_call_id, "a");
        assert_eq!(results[0].payload, ToolPayload::Ok(json!("first")));
        assert_eq!(results[1].tool_call_id, "b");
    }

    #[tokio::test]
    async fn test_unknown_tool_fed_back_not_fatal() {
        let (agentic_loop, provider) = setup_test_loop();
        provider.queue_tool_call("rm_rf", json!({}));
        provider.queue_text("That tool does not exist.");

        let mut conv = Conversation::new();
        let outcome = agentic_loop.run(&mut conv, "x".to_string()).await.unwrap();
        assert_eq!(outcome.answer, "That tool does not exist.");

        let result = conv.tool_results().next().unwrap();
        assert_eq!(result.payload, ToolPayload::Error("Unknown tool: rm_rf".into()));
    }

    #[tokio::test]
    async fn test_tool_loop_exceeded_after_cap() {
        let (agentic_loop, provider) = setup_test_loop();
        let agentic_loop = agentic_loop.with_max_iterations(3);
        provider.repeat(OracleReply::ToolCalls(vec![echo_call("loop", "again")]));

        let mut conv = Conversation::new();
        let err = agentic_loop.run(&mut conv, "spin".to_string()).await.unwrap_err();

        assert!(matches!(err, AgenticLoopError::ToolLoopExceeded(3)));
        assert_eq!(conv.tool_results().count(), 3);
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn test_oracle_failure_recorded_and_returned() {
        let (agentic_loop, provider) = setup_test_loop();
        provider.queue_error("connection reset");
        provider.queue_text("back online");

        let mut conv = Conversation::new();
        let err = agentic_loop.run(&mut conv, "first".to_string()).await.unwrap_err();
        assert!(matches!(err, AgenticLoopError::Oracle(LlmError::NetworkError(_))));
        assert!(matches!(conv.turns().last(), Some(Turn::OracleFailure { .. })));

        // The conversation is still usable for the next question.
        let outcome = agentic_loop.run(&mut conv, "second".to_string()).await.unwrap();
        assert_eq!(outcome.answer, "back online");
    }

    /// Hangs on its first call, answers promptly afterwards.
    struct StallingProvider {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ToolAwareLlmProvider for StallingProvider {
        async fn respond(
            &self,
            _conversation: &Conversation,
            _tools: &[crate::tool::ToolDefinition],
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<OracleReply, LlmError> {
            let n = self
                .calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(OracleReply::Text("recovered".into()))
        }

        fn provider_name(&self) -> &str {
            "stalling"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_oracle_timeout_recorded_and_session_survives() {
        let provider = Arc::new(StallingProvider {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let agentic_loop = AgenticLoop::new(provider, Arc::new(ToolRegistry::new()))
            .with_oracle_timeout(Duration::from_secs(30));

        let mut conv = Conversation::new();
        let err = agentic_loop.run(&mut conv, "first".to_string()).await.unwrap_err();
        assert!(matches!(
            err,
            AgenticLoopError::Oracle(LlmError::Timeout(d)) if d == Duration::from_secs(30)
        ));
        assert!(matches!(conv.turns().last(), Some(Turn::OracleFailure { .. })));

        let outcome = agentic_loop.run(&mut conv, "second".to_string()).await.unwrap();
        assert_eq!(outcome.answer, "recovered");
        assert_eq!(conv.len(), 4);
    }
}
