pub mod analyst;
pub mod call;
pub mod prompt;
pub mod tools;

pub use analyst::{AgentError, Analyst, AnalystSettings};
pub use call::{AnalystToolCall, AnalystToolName};
pub use tools::{build_registry, AnalystTool, AnalystToolbox};
