pub mod providers;

pub use providers::create_tool_provider;
pub use providers::gemini::GeminiToolProvider;
