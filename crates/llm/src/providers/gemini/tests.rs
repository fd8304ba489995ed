//! Unit tests for the Gemini tool provider.

use serde_json::json;

use playwatch_tool_runtime::{
    Conversation, LlmError, OracleReply, ToolAwareLlmProvider, ToolCall, ToolDefinition,
    ToolResult,
};

use super::client::GeminiToolProvider;
use super::translate::{
    conversation_to_gemini, parse_response, tool_definition_to_gemini, tools_to_gemini,
};

fn player_stats_tool() -> ToolDefinition {
    ToolDefinition {
        name: "get_player_stats".to_string(),
        description: "Aggregated behavior for one player".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "player_id": { "type": "string", "description": "Player to look up" }
            },
            "required": ["player_id"]
        }),
    }
}

fn suspicious_tool() -> ToolDefinition {
    ToolDefinition {
        name: "get_suspicious_players".to_string(),
        description: "Players above the APM limit".to_string(),
        input_schema: json!({"type": "object", "properties": {}}),
    }
}

fn call(id: &str, name: &str, input: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        input,
    }
}

#[test]
fn test_tool_definition_translation() {
    let decl = tool_definition_to_gemini(&player_stats_tool());

    assert_eq!(decl["name"], "get_player_stats");
    assert_eq!(decl["description"], "Aggregated behavior for one player");
    assert_eq!(decl["parameters"]["type"], "object");
    assert_eq!(decl["parameters"]["properties"]["player_id"]["type"], "string");
    assert_eq!(decl["parameters"]["required"][0], "player_id");
}

#[test]
fn test_zero_argument_tool_has_no_parameters() {
    let decl = tool_definition_to_gemini(&suspicious_tool());
    assert!(decl.get("parameters").is_none());
}

#[test]
fn test_tools_grouped_under_one_entry() {
    let tools = tools_to_gemini(&[player_stats_tool(), suspicious_tool()]);
    let decls = tools[0]["functionDeclarations"].as_array().unwrap();
    assert_eq!(tools.as_array().unwrap().len(), 1);
    assert_eq!(decls.len(), 2);
}

#[test]
fn test_conversation_translation() {
    let mut conv = Conversation::new();
    conv.add_user_message("Is player 1001 cheating?".to_string());
    let c1 = call("call_0", "get_player_stats", json!({"player_id": "1001"}));
    conv.add_tool_request(c1.clone());
    conv.add_tool_result(ToolResult::ok(&c1, json!({"transaction_count": 4700})));
    conv.add_oracle_text("Yes, very likely.".to_string());

    let contents = conversation_to_gemini(&conv);
    assert_eq!(contents.len(), 4);

    assert_eq!(contents[0]["role"], "user");
    assert_eq!(contents[0]["parts"][0]["text"], "Is player 1001 cheating?");

    assert_eq!(contents[1]["role"], "model");
    let fc = &contents[1]["parts"][0]["functionCall"];
    assert_eq!(fc["name"], "get_player_stats");
    assert_eq!(fc["args"]["player_id"], "1001");

    assert_eq!(contents[2]["role"], "user");
    let fr = &contents[2]["parts"][0]["functionResponse"];
    assert_eq!(fr["name"], "get_player_stats");
    assert_eq!(fr["response"]["content"]["transaction_count"], 4700);

    assert_eq!(contents[3]["role"], "model");
    assert_eq!(contents[3]["parts"][0]["text"], "Yes, very likely.");
}

#[test]
fn test_parallel_calls_share_one_content() {
    let mut conv = Conversation::new();
    conv.add_user_message("compare".to_string());
    let a = call("call_0", "get_suspicious_players", json!({}));
    let b = call("call_1", "get_cluster_stats", serde_json::Value::Null);
    conv.add_tool_request(a.clone());
    conv.add_tool_request(b.clone());
    conv.add_tool_result(ToolResult::ok(&a, json!([])));
    conv.add_tool_result(ToolResult::error(&b, "Tool error: warehouse down"));

    let contents = conversation_to_gemini(&conv);
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[1]["parts"].as_array().unwrap().len(), 2);
    // Null arguments are sent as an empty object.
    assert_eq!(contents[1]["parts"][1]["functionCall"]["args"], json!({}));

    let responses = contents[2]["parts"].as_array().unwrap();
    assert_eq!(responses.len(), 2);
    assert_eq!(
        responses[1]["functionResponse"]["response"]["error"],
        "Tool error: warehouse down"
    );
}

#[test]
fn test_failure_turns_not_sent() {
    let mut conv = Conversation::new();
    conv.add_user_message("first".to_string());
    conv.add_oracle_failure("Network error: reset".to_string());
    conv.add_user_message("second".to_string());

    let contents = conversation_to_gemini(&conv);
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0]["parts"].as_array().unwrap().len(), 2);
}

#[test]
fn test_request_body_structure() {
    let mut conv = Conversation::new().with_system_prompt("You are a security analyst.".into());
    conv.add_user_message("Hello".to_string());

    let body = GeminiToolProvider::build_request_body(&conv, &[suspicious_tool()], 0.1, 4096);

    assert_eq!(
        body["system_instruction"]["parts"][0]["text"],
        "You are a security analyst."
    );
    assert_eq!(body["contents"].as_array().unwrap().len(), 1);
    assert_eq!(
        body["tools"][0]["functionDeclarations"][0]["name"],
        "get_suspicious_players"
    );
    let temp = body["generationConfig"]["temperature"].as_f64().unwrap();
    assert!((temp - 0.1).abs() < 1e-6, "temperature should be ~0.1, got {temp}");
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
}

#[test]
fn test_request_body_without_system_or_tools() {
    let mut conv = Conversation::new();
    conv.add_user_message("Hello".to_string());

    let body = GeminiToolProvider::build_request_body(&conv, &[], 0.5, 2048);
    assert!(body.get("system_instruction").is_none());
    assert!(body.get("tools").is_none());
}

#[test]
fn test_parse_text_response() {
    let resp = json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{"text": "Suspect APM is 4,700, "}, {"text": "170x the baseline."}]
            },
            "finishReason": "STOP"
        }]
    });

    let reply = parse_response(&resp, 0).unwrap();
    assert_eq!(
        reply,
        OracleReply::Text("Suspect APM is 4,700, 170x the baseline.".into())
    );
}

#[test]
fn test_parse_function_calls_in_order() {
    let resp = json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [
                    {"text": "Let me look."},
                    {"functionCall": {"name": "get_player_stats", "args": {"player_id": "1001"}}},
                    {"functionCall": {"name": "get_cluster_stats"}}
                ]
            }
        }]
    });

    let reply = parse_response(&resp, 3).unwrap();
    let OracleReply::ToolCalls(calls) = reply else {
        panic!("expected tool calls");
    };
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].id, "call_3");
    assert_eq!(calls[0].name, "get_player_stats");
    assert_eq!(calls[0].input["player_id"], "1001");
    assert_eq!(calls[1].id, "call_4");
    assert_eq!(calls[1].input, json!({}));
}

#[test]
fn test_parse_blocked_prompt() {
    let resp = json!({"promptFeedback": {"blockReason": "SAFETY"}});
    let err = parse_response(&resp, 0).unwrap_err();
    assert!(matches!(err, LlmError::InvalidResponse(ref m) if m.contains("SAFETY")));
}

#[test]
fn test_parse_empty_parts_is_empty_text() {
    let resp = json!({"candidates": [{"content": {"role": "model"}, "finishReason": "MAX_TOKENS"}]});
    assert_eq!(parse_response(&resp, 0).unwrap(), OracleReply::Text(String::new()));
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    let provider = GeminiToolProvider::new(
        "test-key".into(),
        "gemini-2.5-flash".into(),
        "http://127.0.0.1:1".into(),
    );
    let mut conv = Conversation::new();
    conv.add_user_message("hi".to_string());

    let err = provider.respond(&conv, &[], 0.1, 64).await.unwrap_err();
    assert!(matches!(err, LlmError::NetworkError(_)));
    assert_eq!(provider.provider_name(), "gemini");
}
