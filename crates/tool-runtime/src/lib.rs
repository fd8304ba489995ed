pub mod tool;
pub mod schema;
pub mod registry;
pub mod runtime;
pub mod provider;
pub mod conversation;

pub use tool::{Tool, ToolCall, ToolDefinition, ToolError, ToolPayload, ToolResult};
pub use schema::{decode_args, validate_arguments};
pub use registry::{RegistryError, ToolRegistry};
pub use runtime::{AgenticLoop, AgenticLoopError, LoopOutcome, LoopState};
pub use provider::{LlmError, OracleReply, ToolAwareLlmProvider};
pub use conversation::{Conversation, SessionHandle, Turn, TurnEntry};
