//! Argument validation against a tool's JSON Schema.
//!
//! Only the subset of JSON Schema that tool definitions use is understood:
//! a top-level object with `properties.<name>.type` and a `required` list.
//! LLMs are loose about argument types (numbers arrive as strings, integers
//! as `4700.0`), so scalar values are coerced to the declared type where the
//! conversion is lossless.

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

use crate::tool::ToolError;

/// Validate `input` against `schema` and return the coerced arguments object.
///
/// A `null` input is treated as an empty object, since providers omit the
/// arguments of zero-parameter functions.
pub fn validate_arguments(schema: &Value, input: Value) -> Result<Value, ToolError> {
    let mut args = match input {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => {
            return Err(ToolError::InvalidInput(format!(
                "arguments must be a JSON object, got {}",
                type_name(&other)
            )))
        }
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            match args.get(name) {
                None | Some(Value::Null) => {
                    return Err(ToolError::InvalidInput(format!(
                        "missing required argument '{name}'"
                    )))
                }
                Some(_) => {}
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, property) in properties {
            let Some(expected) = property.get("type").and_then(Value::as_str) else {
                continue;
            };
            let Some(value) = args.remove(name) else {
                continue;
            };
            if value.is_null() {
                args.insert(name.clone(), value);
                continue;
            }
            let coerced = coerce(name, expected, value)?;
            args.insert(name.clone(), coerced);
        }
    }

    Ok(Value::Object(args))
}

/// Decode validated arguments into a typed request.
pub fn decode_args<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

fn coerce(name: &str, expected: &str, value: Value) -> Result<Value, ToolError> {
    let mismatch = |value: &Value| {
        ToolError::InvalidInput(format!(
            "argument '{name}' must be {expected}, got {}",
            type_name(value)
        ))
    };

    match (expected, value) {
        ("string", Value::String(s)) => Ok(Value::String(s)),
        ("string", Value::Number(n)) => Ok(Value::String(n.to_string())),
        ("number", Value::Number(n)) => Ok(Value::Number(n)),
        ("number", Value::String(s)) => match s.trim().parse::<f64>().ok().and_then(Number::from_f64) {
            Some(n) => Ok(Value::Number(n)),
            None => Err(mismatch(&Value::String(s))),
        },
        ("integer", Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                return Ok(Value::Number(n));
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Value::from(f as i64)),
                _ => Err(mismatch(&Value::Number(n))),
            }
        }
        ("integer", Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(i) => Ok(Value::from(i)),
            Err(_) => Err(mismatch(&Value::String(s))),
        },
        ("boolean", Value::Bool(b)) => Ok(Value::Bool(b)),
        ("boolean", Value::String(s)) if s == "true" || s == "false" => Ok(Value::Bool(s == "true")),
        ("object", v @ Value::Object(_)) | ("array", v @ Value::Array(_)) => Ok(v),
        ("string" | "number" | "integer" | "boolean" | "object" | "array", other) => {
            Err(mismatch(&other))
        }
        (_, other) => Ok(other),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn feature_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "player_id": {"type": "string"},
                "transaction_count": {"type": "number"},
                "window_minutes": {"type": "integer"},
                "include_items": {"type": "boolean"}
            },
            "required": ["player_id", "transaction_count"]
        })
    }

    #[test]
    fn test_null_input_is_empty_object() {
        let schema = json!({"type": "object", "properties": {}});
        assert_eq!(validate_arguments(&schema, Value::Null).unwrap(), json!({}));
    }

    #[test]
    fn test_non_object_rejected() {
        let err = validate_arguments(&feature_schema(), json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("must be a JSON object"));
    }

    #[test]
    fn test_missing_required_names_argument() {
        let err = validate_arguments(&feature_schema(), json!({"player_id": "p1"})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(ref m) if m.contains("'transaction_count'")));
    }

    #[test]
    fn test_null_required_counts_as_missing() {
        let err = validate_arguments(
            &feature_schema(),
            json!({"player_id": null, "transaction_count": 3}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("'player_id'"));
    }

    #[test]
    fn test_numeric_coercions() {
        let args = validate_arguments(
            &feature_schema(),
            json!({
                "player_id": 1001,
                "transaction_count": "4700",
                "window_minutes": 5.0,
                "include_items": "true"
            }),
        )
        .unwrap();
        assert_eq!(args["player_id"], json!("1001"));
        assert_eq!(args["transaction_count"].as_f64(), Some(4700.0));
        assert_eq!(args["window_minutes"], json!(5));
        assert_eq!(args["include_items"], json!(true));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let err = validate_arguments(
            &feature_schema(),
            json!({"player_id": "p1", "transaction_count": "lots"}),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid input: argument 'transaction_count' must be number, got string"
        );
    }

    #[test]
    fn test_fractional_integer_rejected() {
        let err = validate_arguments(
            &feature_schema(),
            json!({"player_id": "p1", "transaction_count": 1, "window_minutes": 2.5}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("'window_minutes'"));
    }

    #[test]
    fn test_unknown_arguments_pass_through() {
        let args = validate_arguments(
            &feature_schema(),
            json!({"player_id": "p1", "transaction_count": 1, "note": "extra"}),
        )
        .unwrap();
        assert_eq!(args["note"], json!("extra"));
    }

    #[test]
    fn test_decode_args() {
        #[derive(Debug, Deserialize)]
        struct Args {
            player_id: String,
        }
        let args: Args = decode_args(json!({"player_id": "p1"})).unwrap();
        assert_eq!(args.player_id, "p1");

        let err = decode_args::<Args>(json!({})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }
}
