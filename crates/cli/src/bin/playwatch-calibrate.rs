//! Fit normalization stats from warehouse history and, when an endpoint is
//! configured, derive the scoring threshold from its reconstruction errors.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use playwatch_anomaly::calibrate::DEFAULT_QUANTILE;
use playwatch_anomaly::{calibrate_threshold, feature_rows, NormalizationStats, VertexEndpointClient};
use playwatch_core::config::{load_dotenv, Config};
use playwatch_warehouse::{queries, BigQueryClient, QueryParam, TabularQuery};

#[derive(Parser, Debug)]
#[command(
    name = "playwatch-calibrate",
    about = "Fit normalization stats and the anomaly threshold from history"
)]
struct CalibrateArgs {
    /// Where to write the stats JSON (defaults to SCORING_STATS_PATH)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Maximum history rows to fit on
    #[arg(long, default_value_t = 100_000)]
    limit: i64,

    /// Rows sent to the endpoint for the threshold (one prediction each)
    #[arg(long, default_value_t = 1_000)]
    threshold_rows: usize,

    /// Quantile of reconstruction errors used as the threshold
    #[arg(long, default_value_t = DEFAULT_QUANTILE)]
    quantile: f64,

    /// Config profile; keys are looked up as {PROFILE}_{KEY} first
    #[arg(long, env = "PLAYWATCH_PROFILE")]
    profile: Option<String>,

    /// Google Cloud project id (overrides GCP_PROJECT_ID)
    #[arg(long)]
    project: Option<String>,

    /// Vertex AI endpoint to calibrate against (overrides VERTEX_ENDPOINT_ID)
    #[arg(long)]
    endpoint_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let args = CalibrateArgs::parse();

    let mut config = match &args.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    }
    .context("failed to load configuration")?;
    if let Some(project) = &args.project {
        config.gcp.project_id = Some(project.clone());
    }
    if let Some(endpoint_id) = &args.endpoint_id {
        config.endpoint.endpoint_id = Some(endpoint_id.clone());
    }
    config.log_summary();
    let output = args
        .output
        .clone()
        .or_else(|| config.scoring.stats_path.clone())
        .unwrap_or_else(|| PathBuf::from("game_health_stats.json"));

    let warehouse = BigQueryClient::from_config(&config).context("failed to configure BigQuery")?;
    let sql = queries::training_rows(warehouse.dataset());
    let rows = warehouse
        .query(&sql, &[QueryParam::int64("limit", args.limit)])
        .await
        .context("failed to load training history")?;
    if rows.is_empty() {
        bail!("no training history in {}.stats_per_minute", warehouse.dataset());
    }
    info!(rows = rows.len(), "loaded training history");

    let features = feature_rows(&rows)?;
    let stats = NormalizationStats::fit(&features, config.scoring.epsilon)?;
    stats
        .to_json_file(&output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("SCORING_STATS_PATH={}", output.display());

    if config.endpoint.endpoint_id.is_none() {
        warn!("no endpoint configured, skipping threshold calibration");
        return Ok(());
    }
    let oracle = VertexEndpointClient::from_config(&config).context("failed to configure endpoint")?;
    let sample = &features[..features.len().min(args.threshold_rows)];
    let threshold = calibrate_threshold(&stats, &oracle, sample, args.quantile).await?;
    println!("SCORING_THRESHOLD={threshold}");
    Ok(())
}
