//! Gemini (Google AI) implementation of [`ToolAwareLlmProvider`].
//!
//! Uses the non-streaming `generateContent` endpoint with function calling.
//! Gemini does not assign ids to function calls, so they are synthesized
//! from the number of tool requests already in the conversation.

mod client;
mod translate;

pub use self::client::GeminiToolProvider;

#[cfg(test)]
mod tests;
