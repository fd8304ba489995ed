use crate::tool::{ToolCall, ToolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque key for one multi-turn session with the LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle(Uuid);

impl SessionHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One step of the dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    /// User's text input
    User { text: String },
    /// Plain-text answer from the LLM
    OracleText { text: String },
    /// The LLM asked for a tool to be run
    OracleToolRequest(ToolCall),
    /// Outcome of a dispatched tool call
    ToolResult(ToolResult),
    /// The LLM could not be reached (error or timeout)
    OracleFailure { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEntry {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub turn: Turn,
}

/// Conversation history for one session.
///
/// Append-only: turns are never rewritten, reordered or dropped. A
/// conversation belongs to exactly one loop and is only mutated through
/// `&mut self`, so two loops cannot interleave turns in it.
#[derive(Debug, Clone)]
pub struct Conversation {
    session: SessionHandle,
    system_prompt: Option<String>,
    entries: Vec<TurnEntry>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            session: SessionHandle::new(),
            system_prompt: None,
            entries: Vec::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = Some(prompt);
        self
    }

    pub fn session(&self) -> SessionHandle {
        self.session
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn add_user_message(&mut self, text: String) {
        self.push(Turn::User { text });
    }

    pub fn add_oracle_text(&mut self, text: String) {
        self.push(Turn::OracleText { text });
    }

    pub fn add_tool_request(&mut self, call: ToolCall) {
        self.push(Turn::OracleToolRequest(call));
    }

    pub fn add_tool_result(&mut self, result: ToolResult) {
        self.push(Turn::ToolResult(result));
    }

    pub fn add_oracle_failure(&mut self, message: String) {
        self.push(Turn::OracleFailure { message });
    }

    fn push(&mut self, turn: Turn) {
        self.entries.push(TurnEntry {
            at: Utc::now(),
            turn,
        });
    }

    pub fn entries(&self) -> &[TurnEntry] {
        &self.entries
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.entries.iter().map(|e| &e.turn)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tool results recorded so far, oldest first.
    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResult> {
        self.turns().filter_map(|t| match t {
            Turn::ToolResult(r) => Some(r),
            _ => None,
        })
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolPayload;

    #[test]
    fn test_conversation_basic() {
        let mut conv = Conversation::new();
        conv.add_user_message("Hello".to_string());
        conv.add_oracle_text("Hi there!".to_string());

        assert_eq!(conv.len(), 2);
        assert_eq!(
            conv.turns().last(),
            Some(&Turn::OracleText {
                text: "Hi there!".into()
            })
        );
    }

    #[test]
    fn test_conversation_with_tool_calls() {
        let mut conv = Conversation::new();
        conv.add_user_message("Did we catch anyone today?".to_string());
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "get_suspicious_players".to_string(),
            input: serde_json::json!({}),
        };
        conv.add_tool_request(call.clone());
        conv.add_tool_result(ToolResult::ok(&call, serde_json::json!([])));

        assert_eq!(conv.len(), 3);
        assert_eq!(conv.tool_results().count(), 1);
        assert!(matches!(
            conv.tool_results().next().map(|r| &r.payload),
            Some(ToolPayload::Ok(_))
        ));
    }

    #[test]
    fn test_sessions_are_distinct() {
        assert_ne!(Conversation::new().session(), Conversation::new().session());
    }

    #[test]
    fn test_entry_serialization_is_flat() {
        let mut conv = Conversation::new();
        conv.add_user_message("test".to_string());
        let json = serde_json::to_value(&conv.entries()[0]).unwrap();
        assert_eq!(json["kind"], "user");
        assert_eq!(json["text"], "test");
        assert!(json["at"].is_string());

        let roundtrip: TurnEntry = serde_json::from_value(json).unwrap();
        assert_eq!(roundtrip.turn, Turn::User { text: "test".into() });
    }
}
