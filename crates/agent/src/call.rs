//! The closed set of tool requests the analyst understands.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use playwatch_anomaly::FeatureVector;
use playwatch_tool_runtime::ToolError;

/// Names of the analyst tools, as exposed to the LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalystToolName {
    GetSuspiciousPlayers,
    GetClusterStats,
    GetPlayerStats,
    CheckAnomalyScore,
}

impl AnalystToolName {
    pub const ALL: [AnalystToolName; 4] = [
        Self::GetSuspiciousPlayers,
        Self::GetClusterStats,
        Self::GetPlayerStats,
        Self::CheckAnomalyScore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetSuspiciousPlayers => "get_suspicious_players",
            Self::GetClusterStats => "get_cluster_stats",
            Self::GetPlayerStats => "get_player_stats",
            Self::CheckAnomalyScore => "check_anomaly_score",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

/// Arguments of a tool that takes none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoArgs {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatsArgs {
    pub player_id: String,
}

/// Raw counters as reported by `get_player_stats`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScoreArgs {
    pub transaction_count: f64,
    pub total_quantity: f64,
    pub unique_players: f64,
    pub avg_price: f64,
}

impl AnomalyScoreArgs {
    pub fn features(&self) -> FeatureVector {
        FeatureVector::new(
            self.transaction_count,
            self.total_quantity,
            self.unique_players,
            self.avg_price,
        )
    }
}

/// A decoded tool request. Each variant carries its typed arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "args", rename_all = "snake_case")]
pub enum AnalystToolCall {
    GetSuspiciousPlayers(NoArgs),
    GetClusterStats(NoArgs),
    GetPlayerStats(PlayerStatsArgs),
    CheckAnomalyScore(AnomalyScoreArgs),
}

impl AnalystToolCall {
    /// Decode validated arguments for the named tool.
    pub fn decode(name: AnalystToolName, args: Value) -> Result<Self, ToolError> {
        let args = if args.is_null() { json!({}) } else { args };
        serde_json::from_value(json!({ "name": name.as_str(), "args": args }))
            .map_err(|e| ToolError::InvalidInput(e.to_string()))
    }

    pub fn name(&self) -> AnalystToolName {
        match self {
            Self::GetSuspiciousPlayers(_) => AnalystToolName::GetSuspiciousPlayers,
            Self::GetClusterStats(_) => AnalystToolName::GetClusterStats,
            Self::GetPlayerStats(_) => AnalystToolName::GetPlayerStats,
            Self::CheckAnomalyScore(_) => AnalystToolName::CheckAnomalyScore,
        }
    }
}
