//! Translation between provider-agnostic conversation types and the Gemini
//! `generateContent` format.

use serde_json::{json, Map, Value};

use playwatch_tool_runtime::{
    Conversation, LlmError, OracleReply, ToolCall, ToolDefinition, ToolPayload, ToolResult, Turn,
};

/// Translate tool definitions into a single Gemini `tools` entry.
pub(super) fn tools_to_gemini(tools: &[ToolDefinition]) -> Value {
    let declarations: Vec<Value> = tools.iter().map(tool_definition_to_gemini).collect();
    json!([{ "functionDeclarations": declarations }])
}

/// Translate a [`ToolDefinition`] into a Gemini function declaration.
///
/// Gemini rejects an empty `properties` object, so zero-argument tools are
/// declared without `parameters`.
pub(super) fn tool_definition_to_gemini(tool: &ToolDefinition) -> Value {
    let mut decl = json!({
        "name": tool.name,
        "description": tool.description,
    });
    let has_properties = tool
        .input_schema
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|p| !p.is_empty());
    if has_properties {
        decl["parameters"] = tool.input_schema.clone();
    }
    decl
}

/// Translate the conversation into Gemini `contents`.
///
/// Adjacent turns with the same role are merged into one content entry:
/// Gemini expects all function calls of a round in one `model` message and
/// all of their responses in the following `user` message. Failure turns are
/// local bookkeeping and are not sent.
pub(super) fn conversation_to_gemini(conversation: &Conversation) -> Vec<Value> {
    let mut contents: Vec<(&'static str, Vec<Value>)> = Vec::new();

    for turn in conversation.turns() {
        let (role, part) = match turn {
            Turn::User { text } => ("user", json!({ "text": text })),
            Turn::OracleText { text } => ("model", json!({ "text": text })),
            Turn::OracleToolRequest(call) => ("model", function_call_part(call)),
            Turn::ToolResult(result) => ("user", function_response_part(result)),
            Turn::OracleFailure { .. } => continue,
        };
        match contents.last_mut() {
            Some((last_role, parts)) if *last_role == role => parts.push(part),
            _ => contents.push((role, vec![part])),
        }
    }

    contents
        .into_iter()
        .map(|(role, parts)| json!({ "role": role, "parts": parts }))
        .collect()
}

fn function_call_part(call: &ToolCall) -> Value {
    let args = if call.input.is_null() {
        json!({})
    } else {
        call.input.clone()
    };
    json!({
        "functionCall": {
            "name": call.name,
            "args": args,
        }
    })
}

fn function_response_part(result: &ToolResult) -> Value {
    let response = match &result.payload {
        ToolPayload::Ok(value) => json!({ "content": value }),
        ToolPayload::Error(message) => json!({ "error": message }),
    };
    json!({
        "functionResponse": {
            "name": result.tool_name,
            "response": response,
        }
    })
}

/// Parse a `generateContent` response body.
///
/// Function calls win over text: if any part is a `functionCall`, the reply
/// is a tool request and accompanying text is dropped. Ids are synthesized
/// as `call_<n>` starting at `first_id`.
pub(super) fn parse_response(body: &Value, first_id: usize) -> Result<OracleReply, LlmError> {
    let Some(candidate) = body["candidates"].as_array().and_then(|c| c.first()) else {
        let reason = body["promptFeedback"]["blockReason"]
            .as_str()
            .unwrap_or("no candidates");
        return Err(LlmError::InvalidResponse(format!(
            "Gemini returned no candidate: {reason}"
        )));
    };

    let parts = candidate["content"]["parts"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default();

    let calls: Vec<ToolCall> = parts
        .iter()
        .filter_map(|part| part.get("functionCall"))
        .enumerate()
        .map(|(i, fc)| {
            let name = fc["name"].as_str().ok_or_else(|| {
                LlmError::InvalidResponse("functionCall without a name".into())
            })?;
            Ok(ToolCall {
                id: format!("call_{}", first_id + i),
                name: name.to_string(),
                input: match fc.get("args") {
                    Some(Value::Null) | None => Value::Object(Map::new()),
                    Some(args) => args.clone(),
                },
            })
        })
        .collect::<Result<_, LlmError>>()?;

    if !calls.is_empty() {
        return Ok(OracleReply::ToolCalls(calls));
    }

    let text: String = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();
    Ok(OracleReply::Text(text))
}
