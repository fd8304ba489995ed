use crate::conversation::Conversation;
use crate::tool::{ToolCall, ToolDefinition};
use async_trait::async_trait;

/// What the LLM decided to do with the conversation so far.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleReply {
    /// Final natural-language answer for the user.
    Text(String),
    /// One or more tool requests, in the order they should be dispatched.
    ToolCalls(Vec<ToolCall>),
}

/// Trait for LLM providers that support tool use.
///
/// This trait lives in tool-runtime (not in crates/llm) because it's
/// defined by the consumer (the agentic loop), not the provider.
/// Implementations live in crates/llm.
#[async_trait]
pub trait ToolAwareLlmProvider: Send + Sync {
    /// Send the full conversation (keyed by its session handle) plus the
    /// available tool schemas, and get the next reply.
    async fn respond(
        &self,
        conversation: &Conversation,
        tools: &[ToolDefinition],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<OracleReply, LlmError>;

    /// Provider name for logging/debugging (e.g., "gemini")
    fn provider_name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Authentication failed")]
    AuthError,
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Scripted LLM provider for testing the agentic loop without real API calls.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    enum Scripted {
        Reply(OracleReply),
        Error(String),
    }

    /// Replays queued replies in FIFO order. Once the queue is empty it
    /// repeats the `fallback` reply if one is set, otherwise answers with
    /// empty text.
    pub struct MockLlmProvider {
        replies: Mutex<VecDeque<Scripted>>,
        fallback: Mutex<Option<OracleReply>>,
        calls: AtomicUsize,
        seen_turns: Mutex<Vec<usize>>,
    }

    impl MockLlmProvider {
        pub fn new() -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(None),
                calls: AtomicUsize::new(0),
                seen_turns: Mutex::new(Vec::new()),
            }
        }

        pub fn queue_reply(&self, reply: OracleReply) {
            self.replies.lock().unwrap().push_back(Scripted::Reply(reply));
        }

        /// Queue a plain text answer.
        pub fn queue_text(&self, text: &str) {
            self.queue_reply(OracleReply::Text(text.to_string()));
        }

        /// Queue a single tool request.
        pub fn queue_tool_call(&self, name: &str, input: serde_json::Value) {
            let n = self.replies.lock().unwrap().len();
            self.queue_reply(OracleReply::ToolCalls(vec![ToolCall {
                id: format!("call_{n}"),
                name: name.to_string(),
                input,
            }]));
        }

        /// Queue a provider failure.
        pub fn queue_error(&self, message: &str) {
            self.replies
                .lock()
                .unwrap()
                .push_back(Scripted::Error(message.to_string()));
        }

        /// Reply used once the queue is drained, forever.
        pub fn repeat(&self, reply: OracleReply) {
            *self.fallback.lock().unwrap() = Some(reply);
        }

        /// Number of `respond` calls so far.
        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Conversation length observed on each call.
        pub fn seen_turns(&self) -> Vec<usize> {
            self.seen_turns.lock().unwrap().clone()
        }
    }

    impl Default for MockLlmProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ToolAwareLlmProvider for MockLlmProvider {
        async fn respond(
            &self,
            conversation: &Conversation,
            _tools: &[ToolDefinition],
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<OracleReply, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_turns.lock().unwrap().push(conversation.len());

            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some(Scripted::Reply(reply)) => Ok(reply),
                Some(Scripted::Error(message)) => Err(LlmError::NetworkError(message)),
                None => Ok(self
                    .fallback
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| OracleReply::Text(String::new()))),
            }
        }

        fn provider_name(&self) -> &str {
            "mock"
        }
    }
}
