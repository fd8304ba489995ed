pub mod gemini;

use std::sync::Arc;

use playwatch_core::config::LlmConfig;
use playwatch_core::ConfigError;
use playwatch_tool_runtime::ToolAwareLlmProvider;

/// Create the tool-calling LLM provider from config.
pub fn create_tool_provider(
    llm_config: &LlmConfig,
) -> Result<Arc<dyn ToolAwareLlmProvider>, ConfigError> {
    let provider = gemini::GeminiToolProvider::from_config(llm_config)?;
    tracing::info!(model = provider.model(), "using Gemini tool provider");
    Ok(Arc::new(provider))
}
