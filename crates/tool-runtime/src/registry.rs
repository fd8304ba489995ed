use crate::schema::validate_arguments;
use crate::tool::{Tool, ToolCall, ToolDefinition, ToolError, ToolResult};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn Tool>,
}

/// Manages available tools, their schemas, and dispatch.
///
/// Built once at startup and then shared read-only (`Arc<ToolRegistry>`)
/// across conversations.
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    call_timeout: Option<Duration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            call_timeout: None,
        }
    }

    /// Bound every handler invocation; expiry becomes an error payload.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Register a tool. Returns error if name already registered.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let definition = tool.definition();
        if self.tools.contains_key(&definition.name) {
            return Err(RegistryError::DuplicateName(definition.name));
        }
        debug!(tool = %definition.name, "registered tool");
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                handler: tool,
            },
        );
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| t.handler.clone())
    }

    /// All registered tool definitions (for sending to the LLM), sorted by
    /// name so the prompt is stable across runs.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.definition.clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call. Never fails: unknown tools, invalid arguments,
    /// handler errors, timeouts and panics all become error payloads.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let Some(entry) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "LLM requested unknown tool");
            return ToolResult::error(call, format!("Unknown tool: {}", call.name));
        };

        let input = match validate_arguments(&entry.definition.input_schema, call.input.clone()) {
            Ok(input) => input,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "rejected tool arguments");
                return ToolResult::error(call, e.to_string());
            }
        };

        debug!(tool = %call.name, id = %call.id, "dispatching tool call");
        let execution = AssertUnwindSafe(entry.handler.execute(input)).catch_unwind();
        let outcome = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, execution).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(tool = %call.name, ?limit, "tool call timed out");
                    return ToolResult::error(call, ToolError::Timeout(limit).to_string());
                }
            },
            None => execution.await,
        };

        match outcome {
            Ok(Ok(value)) => ToolResult::ok(call, value),
            Ok(Err(e)) => {
                warn!(tool = %call.name, error = %e, "tool failed");
                ToolResult::error(call, format!("Tool error: {}", e))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(tool = %call.name, panic = message, "tool panicked");
                ToolResult::error(call, format!("Tool panicked: {}", message))
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool with name '{0}' is already registered")]
    DuplicateName(String),
}
