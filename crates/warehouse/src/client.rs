//! BigQuery `jobs.query` client.
//!
//! Runs parameterized standard SQL synchronously and converts the tabular
//! response into one JSON object per row.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use playwatch_core::{Config, ConfigError};

use crate::convert::rows_from_response;

/// One result row, column name → value.
pub type Row = Map<String, Value>;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("query request failed: {0}")]
    Network(String),

    #[error("BigQuery returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The job did not finish within `timeoutMs`.
    #[error("query job {job_id} did not complete in time")]
    Incomplete { job_id: String },

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to parse query result: {0}")]
    ParseError(String),
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Named query parameter, referenced as `@name` in SQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParam {
    pub name: String,
    pub value: ParamValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    String(String),
    Int64(i64),
    Float64(f64),
}

impl QueryParam {
    pub fn string(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: ParamValue::String(value.into()),
        }
    }

    pub fn int64(name: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            value: ParamValue::Int64(value),
        }
    }

    pub fn float64(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value: ParamValue::Float64(value),
        }
    }

    /// BigQuery REST representation.
    pub fn to_api(&self) -> Value {
        let (ty, value) = match &self.value {
            ParamValue::String(s) => ("STRING", s.clone()),
            ParamValue::Int64(i) => ("INT64", i.to_string()),
            ParamValue::Float64(f) => ("FLOAT64", f.to_string()),
        };
        json!({
            "name": self.name,
            "parameterType": { "type": ty },
            "parameterValue": { "value": value },
        })
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Runs a parameterized query and returns its rows.
#[async_trait]
pub trait TabularQuery: Send + Sync {
    async fn query(&self, sql: &str, params: &[QueryParam]) -> Result<Vec<Row>, WarehouseError>;

    /// Dataset that table references in SQL are qualified with.
    fn dataset(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct BigQueryClient {
    client: reqwest::Client,
    base_url: String,
    project: String,
    dataset: String,
    access_token: String,
    timeout: Duration,
}

impl BigQueryClient {
    pub fn new(
        base_url: String,
        project: String,
        dataset: String,
        access_token: String,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            project,
            dataset,
            access_token,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let client = Self::new(
            config.warehouse.base_url.clone(),
            config.gcp.require_project_id()?.to_string(),
            config.warehouse.dataset.clone(),
            config.gcp.require_access_token()?.to_string(),
            Duration::from_secs(config.warehouse.timeout_secs),
        );
        info!(
            project = %client.project,
            dataset = %client.dataset,
            "BigQueryClient initialised"
        );
        Ok(client)
    }

    fn endpoint(&self) -> String {
        format!("{}/bigquery/v2/projects/{}/queries", self.base_url, self.project)
    }

    /// Request body for `jobs.query`.
    pub fn request_body(&self, sql: &str, params: &[QueryParam]) -> Value {
        let mut body = json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": self.timeout.as_millis() as u64,
        });
        if !params.is_empty() {
            body["parameterMode"] = json!("NAMED");
            body["queryParameters"] = params.iter().map(QueryParam::to_api).collect();
        }
        body
    }
}

#[async_trait]
impl TabularQuery for BigQueryClient {
    async fn query(&self, sql: &str, params: &[QueryParam]) -> Result<Vec<Row>, WarehouseError> {
        let url = self.endpoint();
        let body = self.request_body(sql, params);
        debug!(sql = %sql, params = params.len(), "Starting BigQuery query");

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send();

        // Give the HTTP round trip a little headroom over the server-side limit.
        let limit = self.timeout + Duration::from_secs(5);
        let response = match tokio::time::timeout(limit, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(WarehouseError::Network(e.to_string())),
            Err(_) => return Err(WarehouseError::Timeout(limit)),
        };

        let status = response.status().as_u16();
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            warn!(status, "BigQuery query failed");
            return Err(WarehouseError::Api { status, message });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| WarehouseError::ParseError(e.to_string()))?;
        let rows = rows_from_response(&payload)?;
        debug!(rows = rows.len(), "BigQuery query complete");
        Ok(rows)
    }

    fn dataset(&self) -> &str {
        &self.dataset
    }
}
