//! The four analyst tools and the registry that exposes them.
//!
//! All tools share one [`AnalystToolbox`] holding the injected collaborators.
//! Each registered [`AnalystTool`] only knows its name: it decodes the
//! validated arguments into an [`AnalystToolCall`] and hands it to the
//! toolbox, which routes on the variant.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use playwatch_anomaly::AnomalyScorer;
use playwatch_tool_runtime::{RegistryError, Tool, ToolDefinition, ToolError, ToolRegistry};
use playwatch_warehouse::{queries, QueryParam, TabularQuery};

use crate::call::{AnalystToolCall, AnalystToolName};

/// Rows returned by `get_suspicious_players`.
pub const SUSPICIOUS_PLAYER_LIMIT: i64 = 5;

/// Collaborators shared by every analyst tool.
pub struct AnalystToolbox {
    warehouse: Arc<dyn TabularQuery>,
    scorer: Arc<AnomalyScorer>,
    suspicious_apm: u32,
}

impl AnalystToolbox {
    pub fn new(
        warehouse: Arc<dyn TabularQuery>,
        scorer: Arc<AnomalyScorer>,
        suspicious_apm: u32,
    ) -> Self {
        Self {
            warehouse,
            scorer,
            suspicious_apm,
        }
    }

    /// Execute a decoded tool request.
    pub async fn run(&self, call: AnalystToolCall) -> Result<Value, ToolError> {
        info!(tool = call.name().as_str(), "running analyst tool");
        match call {
            AnalystToolCall::GetSuspiciousPlayers(_) => self.suspicious_players().await,
            AnalystToolCall::GetClusterStats(_) => self.cluster_stats().await,
            AnalystToolCall::GetPlayerStats(args) => self.player_stats(&args.player_id).await,
            AnalystToolCall::CheckAnomalyScore(args) => {
                let verdict = self
                    .scorer
                    .score(&args.features())
                    .await
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                serde_json::to_value(verdict)
                    .map_err(|e| ToolError::ExecutionFailed(format!("JSON serialization failed: {e}")))
            }
        }
    }

    async fn suspicious_players(&self) -> Result<Value, ToolError> {
        let sql = queries::suspicious_players(self.warehouse.dataset());
        let rows = self
            .warehouse
            .query(
                &sql,
                &[
                    QueryParam::int64("min_apm", i64::from(self.suspicious_apm)),
                    QueryParam::int64("limit", SUSPICIOUS_PLAYER_LIMIT),
                ],
            )
            .await
            .map_err(warehouse_failure)?;
        debug!(rows = rows.len(), "suspicious players");
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }

    async fn cluster_stats(&self) -> Result<Value, ToolError> {
        let sql = queries::cluster_stats(self.warehouse.dataset());
        let rows = self
            .warehouse
            .query(&sql, &[])
            .await
            .map_err(warehouse_failure)?;
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }

    async fn player_stats(&self, player_id: &str) -> Result<Value, ToolError> {
        let sql = queries::player_stats(self.warehouse.dataset());
        let rows = self
            .warehouse
            .query(&sql, &[QueryParam::string("player_id", player_id)])
            .await
            .map_err(warehouse_failure)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Value::Object(row)),
            None => Err(ToolError::ExecutionFailed(format!(
                "Player {player_id} not found in recent logs"
            ))),
        }
    }
}

fn warehouse_failure(e: playwatch_warehouse::WarehouseError) -> ToolError {
    ToolError::ExecutionFailed(format!("warehouse query failed: {e}"))
}

/// One named analyst tool backed by the shared toolbox.
pub struct AnalystTool {
    name: AnalystToolName,
    toolbox: Arc<AnalystToolbox>,
}

impl AnalystTool {
    pub fn new(name: AnalystToolName, toolbox: Arc<AnalystToolbox>) -> Self {
        Self { name, toolbox }
    }
}

#[async_trait]
impl Tool for AnalystTool {
    fn definition(&self) -> ToolDefinition {
        definition(self.name)
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let call = AnalystToolCall::decode(self.name, input)?;
        self.toolbox.run(call).await
    }
}

/// Schema and description the LLM sees for each tool.
pub fn definition(name: AnalystToolName) -> ToolDefinition {
    let (description, input_schema) = match name {
        AnalystToolName::GetSuspiciousPlayers => (
            "Get a list of players currently flagged for high-frequency exploit behavior \
             (actions per minute above the alert limit), busiest first.",
            json!({"type": "object", "properties": {}}),
        ),
        AnalystToolName::GetClusterStats => (
            "Get the statistical definition of 'Normal' vs 'Bot' clusters from the K-Means \
             behavior model. Use this to explain why a player is flagged.",
            json!({"type": "object", "properties": {}}),
        ),
        AnalystToolName::GetPlayerStats => (
            "Get the latest raw stats (velocity, volume, unique players, average price) for a \
             player's busiest minute. Use this FIRST.",
            json!({
                "type": "object",
                "properties": {
                    "player_id": {"type": "string", "description": "Player identifier"}
                },
                "required": ["player_id"]
            }),
        ),
        AnalystToolName::CheckAnomalyScore => (
            "Send a player's stats to the autoencoder model to calculate the anomaly score and \
             get the normal baseline. Use this SECOND, with the numbers from get_player_stats.",
            json!({
                "type": "object",
                "properties": {
                    "transaction_count": {"type": "number", "description": "Actions in the minute"},
                    "total_quantity": {"type": "number", "description": "Items moved in the minute"},
                    "unique_players": {"type": "number", "description": "Distinct players involved"},
                    "avg_price": {"type": "number", "description": "Average price per item"}
                },
                "required": ["transaction_count", "total_quantity", "unique_players", "avg_price"]
            }),
        ),
    };
    ToolDefinition {
        name: name.as_str().to_string(),
        description: description.to_string(),
        input_schema,
    }
}

/// Register all four analyst tools.
pub fn build_registry(
    toolbox: Arc<AnalystToolbox>,
    tool_timeout: Duration,
) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new().with_call_timeout(tool_timeout);
    for name in AnalystToolName::ALL {
        registry.register(AnalystTool::new(name, toolbox.clone()))?;
    }
    Ok(registry)
}
