use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Like the other helpers, but a present-yet-unparseable value is an error
/// rather than a silent fallback. Used for values that change verdicts.
fn profiled_env_f64(profile: &str, key: &str) -> Result<Option<f64>, ConfigError> {
    match profiled_env_opt(profile, key) {
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|e| ConfigError::invalid(key, format!("'{raw}': {e}"))),
        None => Ok(None),
    }
}

/// Comma-separated list of floats, e.g. `27.8,50000,1,100000`.
fn profiled_env_f64_list(profile: &str, key: &str) -> Result<Option<Vec<f64>>, ConfigError> {
    let Some(raw) = profiled_env_opt(profile, key) else {
        return Ok(None);
    };
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|e| ConfigError::invalid(key, format!("'{}': {e}", part.trim())))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub gcp: GcpConfig,
    pub llm: LlmConfig,
    pub endpoint: EndpointConfig,
    pub scoring: ScoringConfig,
    pub warehouse: WarehouseConfig,
    pub agent: AgentConfig,
    pub deploy: DeployConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `PLAYWATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let profile = env_or("PLAYWATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Result<Self, ConfigError> {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Ok(Self {
            profile: p.to_string(),
            gcp: GcpConfig::from_env_profiled(p),
            llm: LlmConfig::from_env_profiled(p),
            endpoint: EndpointConfig::from_env_profiled(p),
            scoring: ScoringConfig::from_env_profiled(p)?,
            warehouse: WarehouseConfig::from_env_profiled(p),
            agent: AgentConfig::from_env_profiled(p),
            deploy: DeployConfig::from_env_profiled(p),
        })
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Everything the analyst session needs before the first question.
    pub fn validate_for_agent(&self) -> Result<(), ConfigError> {
        self.gcp.require_project_id()?;
        self.gcp.require_access_token()?;
        self.llm.require_api_key()?;
        self.endpoint.require_endpoint_id()?;
        self.scoring.require_threshold()?;
        if self.scoring.stats_path.is_none()
            && (self.scoring.mean.is_none() || self.scoring.scale.is_none())
        {
            return Err(ConfigError::Missing(
                "SCORING_STATS_PATH (or SCORING_MEAN and SCORING_SCALE)",
            ));
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::invalid("AGENT_MAX_ITERATIONS", "must be at least 1"));
        }
        Ok(())
    }

    /// Everything the artifact publisher needs.
    pub fn validate_for_deploy(&self) -> Result<(), ConfigError> {
        self.gcp.require_project_id()?;
        self.gcp.require_access_token()?;
        self.deploy.require_bucket()?;
        if self.deploy.min_replicas == 0 || self.deploy.max_replicas < self.deploy.min_replicas {
            return Err(ConfigError::invalid(
                "DEPLOY_MAX_REPLICAS",
                format!(
                    "replica range {}..={} is empty",
                    self.deploy.min_replicas, self.deploy.max_replicas
                ),
            ));
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  gcp:        project={}, location={}",
            self.gcp.project_id.as_deref().unwrap_or("(none)"),
            self.gcp.location
        );
        tracing::info!("  llm:        model={}", self.llm.model);
        tracing::info!(
            "  endpoint:   id={}",
            self.endpoint.endpoint_id.as_deref().unwrap_or("(none)")
        );
        tracing::info!(
            "  scoring:    threshold={:?}, epsilon={}",
            self.scoring.threshold, self.scoring.epsilon
        );
        tracing::info!("  warehouse:  dataset={}", self.warehouse.dataset);
        tracing::info!(
            "  agent:      max_iterations={}, oracle_timeout={}s, tool_timeout={}s",
            self.agent.max_iterations,
            self.agent.oracle_timeout_secs,
            self.agent.tool_timeout_secs
        );
    }

    /// Return a redacted view without secrets.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "gcp": {
                "project_id": self.gcp.project_id,
                "location": self.gcp.location,
                "access_token_set": self.gcp.access_token.is_some(),
            },
            "llm": {
                "model": self.llm.model,
                "configured": self.llm.api_key.is_some(),
            },
            "endpoint": { "endpoint_id": self.endpoint.endpoint_id },
            "scoring": {
                "threshold": self.scoring.threshold,
                "stats_path": self.scoring.stats_path,
                "epsilon": self.scoring.epsilon,
            },
            "warehouse": { "dataset": self.warehouse.dataset },
            "agent": {
                "max_iterations": self.agent.max_iterations,
                "oracle_timeout_secs": self.agent.oracle_timeout_secs,
                "tool_timeout_secs": self.agent.tool_timeout_secs,
            },
        })
    }
}

// ── Google Cloud ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpConfig {
    pub project_id: Option<String>,
    pub location: String,
    /// OAuth bearer token for BigQuery, Vertex AI and Cloud Storage.
    pub access_token: Option<String>,
}

impl GcpConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            project_id: profiled_env_opt(p, "GCP_PROJECT_ID"),
            location: profiled_env_or(p, "GCP_LOCATION", "us-central1"),
            access_token: profiled_env_opt(p, "GCP_ACCESS_TOKEN"),
        }
    }

    pub fn require_project_id(&self) -> Result<&str, ConfigError> {
        self.project_id
            .as_deref()
            .ok_or(ConfigError::Missing("GCP_PROJECT_ID"))
    }

    pub fn require_access_token(&self) -> Result<&str, ConfigError> {
        self.access_token
            .as_deref()
            .ok_or(ConfigError::Missing("GCP_ACCESS_TOKEN"))
    }
}

// ── LLM (Gemini) ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            api_key: profiled_env_opt(p, "GEMINI_API_KEY"),
            model: profiled_env_or(p, "GEMINI_MODEL", "gemini-2.5-flash"),
            base_url: profiled_env_or(
                p,
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com",
            ),
            temperature: profiled_env_or(p, "LLM_TEMPERATURE", "0.1")
                .parse()
                .unwrap_or(0.1),
            max_tokens: profiled_env_u32(p, "LLM_MAX_TOKENS", 4096),
        }
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or(ConfigError::Missing("GEMINI_API_KEY"))
    }
}

// ── Vertex AI prediction endpoint ─────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub endpoint_id: Option<String>,
    /// Overrides `https://{location}-aiplatform.googleapis.com`.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl EndpointConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            endpoint_id: profiled_env_opt(p, "VERTEX_ENDPOINT_ID"),
            base_url: profiled_env_opt(p, "VERTEX_BASE_URL"),
            timeout_secs: profiled_env_u64(p, "VERTEX_TIMEOUT_SECONDS", 30),
        }
    }

    pub fn require_endpoint_id(&self) -> Result<&str, ConfigError> {
        self.endpoint_id
            .as_deref()
            .ok_or(ConfigError::Missing("VERTEX_ENDPOINT_ID"))
    }
}

// ── Anomaly scoring ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Reconstruction-error threshold. Required; there is no built-in default.
    pub threshold: Option<f64>,
    /// JSON file with `{"mean": [...], "scale": [...], "epsilon": ...}`.
    pub stats_path: Option<PathBuf>,
    /// Inline alternative to `stats_path`.
    pub mean: Option<Vec<f64>>,
    pub scale: Option<Vec<f64>>,
    pub epsilon: f64,
}

impl ScoringConfig {
    fn from_env_profiled(p: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            threshold: profiled_env_f64(p, "SCORING_THRESHOLD")?,
            stats_path: profiled_env_opt(p, "SCORING_STATS_PATH").map(PathBuf::from),
            mean: profiled_env_f64_list(p, "SCORING_MEAN")?,
            scale: profiled_env_f64_list(p, "SCORING_SCALE")?,
            epsilon: profiled_env_f64(p, "SCORING_EPSILON")?.unwrap_or(1e-6),
        })
    }

    pub fn require_threshold(&self) -> Result<f64, ConfigError> {
        let threshold = self
            .threshold
            .ok_or(ConfigError::Missing("SCORING_THRESHOLD"))?;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::invalid(
                "SCORING_THRESHOLD",
                format!("{threshold} is not a finite non-negative number"),
            ));
        }
        Ok(threshold)
    }
}

// ── BigQuery warehouse ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub dataset: String,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Minimum actions per minute for a player to be listed as suspicious.
    pub suspicious_apm: u32,
}

impl WarehouseConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            dataset: profiled_env_or(p, "BIGQUERY_DATASET", "eve_data_demo"),
            base_url: profiled_env_or(p, "BIGQUERY_BASE_URL", "https://bigquery.googleapis.com"),
            timeout_secs: profiled_env_u64(p, "BIGQUERY_TIMEOUT_SECONDS", 60),
            suspicious_apm: profiled_env_u32(p, "BIGQUERY_SUSPICIOUS_APM", 2000),
        }
    }
}

// ── Conversation loop ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub oracle_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub system_prompt: Option<String>,
}

impl AgentConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            max_iterations: profiled_env_u32(p, "AGENT_MAX_ITERATIONS", 10) as usize,
            oracle_timeout_secs: profiled_env_u64(p, "AGENT_ORACLE_TIMEOUT_SECONDS", 120),
            tool_timeout_secs: profiled_env_u64(p, "AGENT_TOOL_TIMEOUT_SECONDS", 90),
            system_prompt: profiled_env_opt(p, "AGENT_SYSTEM_PROMPT"),
        }
    }
}

// ── Model publishing ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    pub bucket: Option<String>,
    pub prefix: String,
    pub display_name: String,
    pub serving_image: String,
    pub machine_type: String,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub storage_base_url: String,
}

impl DeployConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            bucket: profiled_env_opt(p, "DEPLOY_BUCKET"),
            prefix: profiled_env_or(p, "DEPLOY_PREFIX", "models/game_health"),
            display_name: profiled_env_or(p, "DEPLOY_DISPLAY_NAME", "game_health_autoencoder_v1"),
            serving_image: profiled_env_or(
                p,
                "DEPLOY_SERVING_IMAGE",
                "us-docker.pkg.dev/vertex-ai/prediction/tf2-cpu.2-12:latest",
            ),
            machine_type: profiled_env_or(p, "DEPLOY_MACHINE_TYPE", "n1-standard-2"),
            min_replicas: profiled_env_u32(p, "DEPLOY_MIN_REPLICAS", 1),
            max_replicas: profiled_env_u32(p, "DEPLOY_MAX_REPLICAS", 1),
            storage_base_url: profiled_env_or(
                p,
                "GCS_BASE_URL",
                "https://storage.googleapis.com",
            ),
        }
    }

    pub fn require_bucket(&self) -> Result<&str, ConfigError> {
        self.bucket.as_deref().ok_or(ConfigError::Missing("DEPLOY_BUCKET"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env-based tests must run serially to avoid interfering with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const KEYS: &[&str] = &[
        "PLAYWATCH_PROFILE",
        "GCP_PROJECT_ID",
        "GCP_LOCATION",
        "GCP_ACCESS_TOKEN",
        "GEMINI_API_KEY",
        "VERTEX_ENDPOINT_ID",
        "SCORING_THRESHOLD",
        "SCORING_STATS_PATH",
        "SCORING_MEAN",
        "SCORING_SCALE",
        "SCORING_EPSILON",
        "AGENT_MAX_ITERATIONS",
        "DEPLOY_BUCKET",
        "TEST_GCP_PROJECT_ID",
        "TEST_SCORING_THRESHOLD",
    ];

    fn clear_env() {
        for k in KEYS {
            env::remove_var(k);
        }
    }

    fn set_agent_env() {
        env::set_var("GCP_PROJECT_ID", "cloud-sa-ml");
        env::set_var("GCP_ACCESS_TOKEN", "token");
        env::set_var("GEMINI_API_KEY", "key");
        env::set_var("VERTEX_ENDPOINT_ID", "4701642562253881344");
        env::set_var("SCORING_THRESHOLD", "10.0");
        env::set_var("SCORING_MEAN", "27.8,50000,1,100000");
        env::set_var("SCORING_SCALE", "10, 20000, 1, 50000");
    }

    #[test]
    fn defaults_when_no_env_vars() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        let cfg = Config::for_profile("").unwrap();
        assert_eq!(cfg.profile_label(), "default");
        assert_eq!(cfg.gcp.location, "us-central1");
        assert_eq!(cfg.llm.model, "gemini-2.5-flash");
        assert_eq!(cfg.agent.max_iterations, 10);
        assert_eq!(cfg.scoring.epsilon, 1e-6);
        assert!(cfg.scoring.threshold.is_none());
    }

    #[test]
    fn threshold_is_required() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();
        set_agent_env();
        env::remove_var("SCORING_THRESHOLD");

        let cfg = Config::for_profile("").unwrap();
        let err = cfg.validate_for_agent().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SCORING_THRESHOLD")));

        clear_env();
    }

    #[test]
    fn unparseable_threshold_is_an_error() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("SCORING_THRESHOLD", "ten");

        let err = Config::for_profile("").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "SCORING_THRESHOLD"));

        clear_env();
    }

    #[test]
    fn validate_for_agent_accepts_inline_stats() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();
        set_agent_env();

        let cfg = Config::for_profile("").unwrap();
        cfg.validate_for_agent().unwrap();
        assert_eq!(cfg.scoring.mean, Some(vec![27.8, 50000.0, 1.0, 100000.0]));
        assert_eq!(cfg.scoring.scale, Some(vec![10.0, 20000.0, 1.0, 50000.0]));

        clear_env();
    }

    #[test]
    fn missing_endpoint_is_fatal() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();
        set_agent_env();
        env::remove_var("VERTEX_ENDPOINT_ID");

        let cfg = Config::for_profile("").unwrap();
        assert!(matches!(
            cfg.validate_for_agent(),
            Err(ConfigError::Missing("VERTEX_ENDPOINT_ID"))
        ));

        clear_env();
    }

    #[test]
    fn profiled_env_takes_precedence() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("GCP_PROJECT_ID", "base-project");
        env::set_var("TEST_GCP_PROJECT_ID", "test-project");

        let cfg = Config::for_profile("test").unwrap();
        assert_eq!(cfg.profile, "TEST");
        assert_eq!(cfg.gcp.project_id.as_deref(), Some("test-project"));

        clear_env();
    }

    #[test]
    fn deploy_requires_bucket() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("GCP_PROJECT_ID", "cloud-sa-ml");
        env::set_var("GCP_ACCESS_TOKEN", "token");

        let cfg = Config::for_profile("").unwrap();
        assert!(matches!(
            cfg.validate_for_deploy(),
            Err(ConfigError::Missing("DEPLOY_BUCKET"))
        ));

        clear_env();
    }

    #[test]
    fn redacted_summary_hides_secrets() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();
        set_agent_env();

        let cfg = Config::for_profile("").unwrap();
        let summary = cfg.redacted_summary().to_string();
        assert!(!summary.contains("\"token\""));
        assert!(summary.contains("access_token_set"));

        clear_env();
    }
}
