//! The security analyst session: one conversation, many questions.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use playwatch_core::config::{AgentConfig, LlmConfig};
use playwatch_tool_runtime::{
    AgenticLoop, AgenticLoopError, Conversation, SessionHandle, ToolAwareLlmProvider, ToolRegistry,
};

use crate::prompt::SYSTEM_PROMPT;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Loop(#[from] AgenticLoopError),
}

/// Loop and prompt settings for one analyst session.
#[derive(Debug, Clone)]
pub struct AnalystSettings {
    pub max_iterations: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub oracle_timeout: Duration,
    pub system_prompt: String,
}

impl Default for AnalystSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            temperature: 0.1,
            max_tokens: 4096,
            oracle_timeout: Duration::from_secs(120),
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }
}

impl AnalystSettings {
    pub fn from_config(agent: &AgentConfig, llm: &LlmConfig) -> Self {
        Self {
            max_iterations: agent.max_iterations,
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
            oracle_timeout: Duration::from_secs(agent.oracle_timeout_secs),
            system_prompt: agent
                .system_prompt
                .clone()
                .unwrap_or_else(|| SYSTEM_PROMPT.to_string()),
        }
    }
}

/// A conversational analyst. Each `Analyst` owns its conversation, so
/// concurrent sessions each get their own instance sharing the registry
/// and provider.
pub struct Analyst {
    agentic_loop: AgenticLoop,
    conversation: Conversation,
}

impl Analyst {
    pub fn new(
        provider: Arc<dyn ToolAwareLlmProvider>,
        registry: Arc<ToolRegistry>,
        settings: AnalystSettings,
    ) -> Self {
        let agentic_loop = AgenticLoop::new(provider, registry)
            .with_max_iterations(settings.max_iterations)
            .with_temperature(settings.temperature)
            .with_max_tokens(settings.max_tokens)
            .with_oracle_timeout(settings.oracle_timeout);
        let conversation = Conversation::new().with_system_prompt(settings.system_prompt);
        info!(session = %conversation.session(), "analyst session started");
        Self {
            agentic_loop,
            conversation,
        }
    }

    /// Ask one question and get the final answer. History carries over to
    /// the next question.
    pub async fn query_agent(&mut self, user_text: &str) -> Result<String, AgentError> {
        info!(session = %self.conversation.session(), "user question");
        let outcome = self
            .agentic_loop
            .run(&mut self.conversation, user_text.to_string())
            .await?;
        Ok(outcome.answer)
    }

    pub fn session(&self) -> SessionHandle {
        self.conversation.session()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }
}
