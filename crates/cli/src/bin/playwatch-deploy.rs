//! Publish a trained autoencoder directory to a Vertex AI endpoint.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use playwatch_anomaly::publish::VertexPublisherSettings;
use playwatch_anomaly::{ArtifactPublisher, VertexPublisher};
use playwatch_core::config::{load_dotenv, Config};

#[derive(Parser, Debug)]
#[command(name = "playwatch-deploy", about = "Upload and deploy the anomaly model")]
struct DeployArgs {
    /// Directory holding the exported model (e.g. a TensorFlow SavedModel)
    model_dir: PathBuf,

    /// Config profile; keys are looked up as {PROFILE}_{KEY} first
    #[arg(long, env = "PLAYWATCH_PROFILE")]
    profile: Option<String>,

    /// Google Cloud project id (overrides GCP_PROJECT_ID)
    #[arg(long)]
    project: Option<String>,

    /// Google Cloud region (overrides GCP_LOCATION)
    #[arg(long)]
    location: Option<String>,

    /// Cloud Storage bucket for the artifacts (overrides DEPLOY_BUCKET)
    #[arg(long)]
    bucket: Option<String>,
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
    let args = DeployArgs::parse();

    let mut config = match &args.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    }
    .context("failed to load configuration")?;
    if let Some(project) = &args.project {
        config.gcp.project_id = Some(project.clone());
    }
    if let Some(location) = &args.location {
        config.gcp.location = location.clone();
    }
    if let Some(bucket) = &args.bucket {
        config.deploy.bucket = Some(bucket.clone());
    }
    config.log_summary();
    config.validate_for_deploy().context("configuration is incomplete")?;

    let settings = VertexPublisherSettings::from_config(&config)?;
    info!(
        model_dir = %args.model_dir.display(),
        bucket = %settings.bucket,
        "publishing model"
    );
    let publisher = VertexPublisher::new(settings);
    let published = publisher
        .publish(&args.model_dir)
        .await
        .with_context(|| format!("failed to publish {}", args.model_dir.display()))?;

    println!("model:       {}", published.model);
    println!("endpoint:    {}", published.endpoint);
    println!("ENDPOINT ID: {}", published.endpoint_id);
    println!("Set VERTEX_ENDPOINT_ID={} for the analyst.", published.endpoint_id);
    Ok(())
}
