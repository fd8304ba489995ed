use clap::Parser;

use playwatch_core::Config;

/// Warnings only, plus the startup config summary.
pub const DEFAULT_LOG_FILTER: &str = "warn,playwatch_core=info";

/// Conversational security analyst for game telemetry.
///
/// Each QUESTION is answered in order within one session. With no
/// questions, reads one question per line from stdin until EOF.
#[derive(Parser, Debug)]
#[command(name = "playwatch", about = "Ask questions about anomalous player behavior")]
pub struct CliArgs {
    /// Questions to ask, in order
    pub questions: Vec<String>,

    /// Config profile; keys are looked up as {PROFILE}_{KEY} first
    #[arg(long, env = "PLAYWATCH_PROFILE")]
    pub profile: Option<String>,

    /// Google Cloud project id (overrides GCP_PROJECT_ID)
    #[arg(long)]
    pub project: Option<String>,

    /// Google Cloud region (overrides GCP_LOCATION)
    #[arg(long)]
    pub location: Option<String>,

    /// Vertex AI endpoint serving the autoencoder (overrides VERTEX_ENDPOINT_ID)
    #[arg(long)]
    pub endpoint_id: Option<String>,
}

impl CliArgs {
    /// Flags win over environment and profile values.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(project) = &self.project {
            config.gcp.project_id = Some(project.clone());
        }
        if let Some(location) = &self.location {
            config.gcp.location = location.clone();
        }
        if let Some(endpoint_id) = &self.endpoint_id {
            config.endpoint.endpoint_id = Some(endpoint_id.clone());
        }
    }
}
