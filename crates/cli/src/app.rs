//! Construction of the analyst and its collaborators from config.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use playwatch_agent::{build_registry, Analyst, AnalystSettings, AnalystToolbox};
use playwatch_anomaly::{AnomalyScorer, NormalizationStats, VertexEndpointClient};
use playwatch_core::Config;
use playwatch_warehouse::BigQueryClient;

/// Build an analyst session. Every collaborator is created here and
/// injected; nothing below this point reads the environment.
pub fn build_analyst(config: &Config) -> Result<Analyst> {
    config
        .validate_for_agent()
        .context("configuration is incomplete")?;

    let stats = NormalizationStats::from_config(&config.scoring)
        .context("failed to load normalization stats")?;
    let threshold = config.scoring.require_threshold()?;
    let oracle = Arc::new(
        VertexEndpointClient::from_config(config).context("failed to configure endpoint")?,
    );
    info!(url = oracle.predict_url(), threshold, "anomaly scorer ready");
    let scorer = Arc::new(AnomalyScorer::new(stats, oracle, threshold)?);

    let warehouse = Arc::new(
        BigQueryClient::from_config(config).context("failed to configure BigQuery")?,
    );
    let toolbox = Arc::new(AnalystToolbox::new(
        warehouse,
        scorer,
        config.warehouse.suspicious_apm,
    ));
    let registry = build_registry(
        toolbox,
        Duration::from_secs(config.agent.tool_timeout_secs),
    )?;

    let provider = playwatch_llm::create_tool_provider(&config.llm)
        .context("failed to create LLM provider")?;

    Ok(Analyst::new(
        provider,
        Arc::new(registry),
        AnalystSettings::from_config(&config.agent, &config.llm),
    ))
}
