//! Conversion of BigQuery `jobs.query` responses into row maps.
//!
//! BigQuery returns every cell as a string inside `{"f": [{"v": ...}]}`;
//! the declared column type decides the JSON type:
//! - `INTEGER`, `INT64` → integer (with fallback to string)
//! - `FLOAT`, `FLOAT64`, `NUMERIC`, `BIGNUMERIC` → number (with fallback to string)
//! - `BOOLEAN`, `BOOL` → boolean (with fallback to string)
//! - anything else → string
//!
//! SQL NULL becomes JSON `null`.

use serde_json::{Map, Number, Value};

use crate::client::{Row, WarehouseError};

struct Column {
    name: String,
    data_type: String,
}

pub fn rows_from_response(payload: &Value) -> Result<Vec<Row>, WarehouseError> {
    if !payload["jobComplete"].as_bool().unwrap_or(true) {
        let job_id = payload["jobReference"]["jobId"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();
        return Err(WarehouseError::Incomplete { job_id });
    }

    let columns: Vec<Column> = payload["schema"]["fields"]
        .as_array()
        .map(|fields| {
            fields
                .iter()
                .map(|f| Column {
                    name: f["name"].as_str().unwrap_or_default().to_string(),
                    data_type: f["type"].as_str().unwrap_or("STRING").to_uppercase(),
                })
                .collect()
        })
        .unwrap_or_default();

    // A query with no result rows omits `rows` entirely.
    let Some(rows) = payload["rows"].as_array() else {
        return Ok(Vec::new());
    };

    rows.iter()
        .enumerate()
        .map(|(r, row)| {
            let cells = row["f"].as_array().ok_or_else(|| {
                WarehouseError::ParseError(format!("row {r} has no cells"))
            })?;
            if cells.len() != columns.len() {
                return Err(WarehouseError::ParseError(format!(
                    "row {r} has {} cells for {} columns",
                    cells.len(),
                    columns.len()
                )));
            }
            let mut out = Map::with_capacity(columns.len());
            for (col, cell) in columns.iter().zip(cells) {
                out.insert(col.name.clone(), parse_cell(&cell["v"], &col.data_type));
            }
            Ok(out)
        })
        .collect()
}

fn parse_cell(raw: &Value, data_type: &str) -> Value {
    let Some(text) = raw.as_str() else {
        // NULL, or a nested RECORD / REPEATED value passed through as-is.
        return raw.clone();
    };

    match data_type {
        "INTEGER" | "INT64" => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(text.to_string())),
        "BOOLEAN" | "BOOL" => match text.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(text.to_string()),
        },
        _ => Value::String(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(rows: Value) -> Value {
        json!({
            "kind": "bigquery#queryResponse",
            "schema": {"fields": [
                {"name": "player_id", "type": "STRING"},
                {"name": "actions_per_minute", "type": "INTEGER"},
                {"name": "avg_price", "type": "FLOAT"},
                {"name": "flagged", "type": "BOOLEAN"}
            ]},
            "jobComplete": true,
            "rows": rows
        })
    }

    #[test]
    fn test_typed_conversion() {
        let payload = response(json!([
            {"f": [{"v": "Bugged_Player_001"}, {"v": "4746"}, {"v": "90000.5"}, {"v": "true"}]}
        ]));
        let rows = rows_from_response(&payload).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["player_id"], "Bugged_Player_001");
        assert_eq!(rows[0]["actions_per_minute"], 4746);
        assert_eq!(rows[0]["avg_price"], 90000.5);
        assert_eq!(rows[0]["flagged"], true);
    }

    #[test]
    fn test_null_cells() {
        let payload = response(json!([
            {"f": [{"v": "p"}, {"v": null}, {"v": null}, {"v": null}]}
        ]));
        let rows = rows_from_response(&payload).unwrap();
        assert!(rows[0]["actions_per_minute"].is_null());
        assert!(rows[0]["avg_price"].is_null());
    }

    #[test]
    fn test_unparseable_falls_back_to_string() {
        let payload = response(json!([
            {"f": [{"v": "p"}, {"v": "lots"}, {"v": "NaN"}, {"v": "maybe"}]}
        ]));
        let rows = rows_from_response(&payload).unwrap();
        assert_eq!(rows[0]["actions_per_minute"], "lots");
        assert_eq!(rows[0]["avg_price"], "NaN");
        assert_eq!(rows[0]["flagged"], "maybe");
    }

    #[test]
    fn test_no_rows() {
        let mut payload = response(json!([]));
        payload.as_object_mut().unwrap().remove("rows");
        assert!(rows_from_response(&payload).unwrap().is_empty());
    }

    #[test]
    fn test_incomplete_job() {
        let payload = json!({
            "jobComplete": false,
            "jobReference": {"projectId": "cloud-sa-ml", "jobId": "job_abc"}
        });
        let err = rows_from_response(&payload).unwrap_err();
        assert!(matches!(err, WarehouseError::Incomplete { ref job_id } if job_id == "job_abc"));
    }

    #[test]
    fn test_ragged_row_rejected() {
        let payload = response(json!([{"f": [{"v": "p"}]}]));
        assert!(matches!(
            rows_from_response(&payload),
            Err(WarehouseError::ParseError(_))
        ));
    }
}
