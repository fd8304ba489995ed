//! [`ToolAwareLlmProvider`] trait implementation for the Gemini API.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use playwatch_core::config::LlmConfig;
use playwatch_core::ConfigError;
use playwatch_tool_runtime::{
    Conversation, LlmError, OracleReply, ToolAwareLlmProvider, ToolDefinition, Turn,
};

use super::translate::{conversation_to_gemini, parse_response, tools_to_gemini};

/// Gemini provider with function-calling support.
pub struct GeminiToolProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiToolProvider {
    /// Create a new Gemini tool provider.
    ///
    /// # Arguments
    /// * `api_key` - Google AI Studio API key
    /// * `model` - Model name (e.g. `"gemini-2.5-flash"`)
    /// * `base_url` - API base URL (e.g. `"https://generativelanguage.googleapis.com"`)
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ConfigError> {
        let api_key = config.require_api_key()?;
        Ok(Self::new(
            api_key.to_string(),
            config.model.clone(),
            config.base_url.clone(),
        ))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    /// Build the request body for the Gemini generateContent API.
    pub(super) fn build_request_body(
        conversation: &Conversation,
        tools: &[ToolDefinition],
        temperature: f32,
        max_tokens: u32,
    ) -> Value {
        let mut body = json!({
            "contents": conversation_to_gemini(conversation),
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": max_tokens,
            },
        });

        if !tools.is_empty() {
            body["tools"] = tools_to_gemini(tools);
        }

        if let Some(system) = conversation.system_prompt() {
            body["system_instruction"] = json!({
                "parts": [{ "text": system }],
            });
        }

        body
    }
}

#[async_trait]
impl ToolAwareLlmProvider for GeminiToolProvider {
    async fn respond(
        &self,
        conversation: &Conversation,
        tools: &[ToolDefinition],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<OracleReply, LlmError> {
        let url = self.endpoint();
        let body = Self::build_request_body(conversation, tools, temperature, max_tokens);

        debug!(
            model = %self.model,
            session = %conversation.session(),
            turns = conversation.len(),
            "Gemini generateContent request"
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status().as_u16();

        if status != 200 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body_text = response.text().await.unwrap_or_default();

            return Err(match status {
                401 | 403 => LlmError::AuthError,
                429 => LlmError::RateLimited {
                    retry_after_secs: retry_after.unwrap_or(30),
                },
                _ => LlmError::ApiError {
                    status,
                    message: body_text,
                },
            });
        }

        let resp: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let issued = conversation
            .turns()
            .filter(|t| matches!(t, Turn::OracleToolRequest(_)))
            .count();
        let reply = parse_response(&resp, issued)?;

        if let OracleReply::ToolCalls(calls) = &reply {
            debug!(count = calls.len(), "Gemini requested function calls");
        }
        Ok(reply)
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }
}
