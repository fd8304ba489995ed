//! Publishing a trained model directory to Vertex AI.
//!
//! Uploads every file under the directory to Cloud Storage, registers the
//! model with a serving container, creates an endpoint and deploys the model
//! onto it. Long-running operations are polled with capped exponential
//! backoff.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use playwatch_core::{Config, ConfigError};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("model directory {0} contains no files")]
    EmptyModelDir(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("{url} returned {status}: {message}")]
    Api {
        url: String,
        status: u16,
        message: String,
    },

    #[error("operation {name} failed: {message}")]
    OperationFailed { name: String, message: String },

    #[error("operation {name} still running after {seconds}s")]
    OperationTimeout { name: String, seconds: u64 },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Resource names of a published model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedModel {
    /// `gs://bucket/prefix` the artifacts were uploaded to.
    pub artifact_uri: String,
    /// `projects/.../locations/.../models/...`
    pub model: String,
    /// `projects/.../locations/.../endpoints/...`
    pub endpoint: String,
    /// Trailing id of `endpoint`, the value for `VERTEX_ENDPOINT_ID`.
    pub endpoint_id: String,
}

/// A local file and the object name it is uploaded as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub local_path: PathBuf,
    pub object_name: String,
}

#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    async fn publish(&self, model_dir: &Path) -> Result<PublishedModel, PublishError>;
}

/// List the files under `model_dir` with object names `{prefix}/{relative}`,
/// sorted for a deterministic upload order.
pub fn collect_artifacts(model_dir: &Path, prefix: &str) -> Result<Vec<Artifact>, PublishError> {
    let prefix = prefix.trim_matches('/');
    let mut artifacts = Vec::new();

    for entry in WalkDir::new(model_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| PublishError::Io {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| model_dir.to_path_buf()),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory loop")),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(model_dir)
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let object_name = if prefix.is_empty() {
            relative.join("/")
        } else {
            format!("{prefix}/{}", relative.join("/"))
        };
        artifacts.push(Artifact {
            local_path: entry.into_path(),
            object_name,
        });
    }

    if artifacts.is_empty() {
        return Err(PublishError::EmptyModelDir(model_dir.to_path_buf()));
    }
    Ok(artifacts)
}

/// Last path segment of a resource name.
pub fn resource_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

// ---------------------------------------------------------------------------
// Vertex AI publisher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct VertexPublisherSettings {
    pub project: String,
    pub location: String,
    pub access_token: String,
    pub bucket: String,
    pub prefix: String,
    pub display_name: String,
    pub serving_image: String,
    pub machine_type: String,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub storage_base_url: String,
    pub vertex_base_url: String,
    pub operation_timeout: Duration,
}

impl VertexPublisherSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let location = config.gcp.location.clone();
        let vertex_base_url = config
            .endpoint
            .base_url
            .clone()
            .unwrap_or_else(|| format!("https://{location}-aiplatform.googleapis.com"));
        Ok(Self {
            project: config.gcp.require_project_id()?.to_string(),
            access_token: config.gcp.require_access_token()?.to_string(),
            bucket: config.deploy.require_bucket()?.to_string(),
            prefix: config.deploy.prefix.clone(),
            display_name: config.deploy.display_name.clone(),
            serving_image: config.deploy.serving_image.clone(),
            machine_type: config.deploy.machine_type.clone(),
            min_replicas: config.deploy.min_replicas,
            max_replicas: config.deploy.max_replicas,
            storage_base_url: config.deploy.storage_base_url.trim_end_matches('/').to_string(),
            vertex_base_url: vertex_base_url.trim_end_matches('/').to_string(),
            location,
            operation_timeout: Duration::from_secs(45 * 60),
        })
    }

    fn parent(&self) -> String {
        format!("projects/{}/locations/{}", self.project, self.location)
    }
}

pub struct VertexPublisher {
    client: reqwest::Client,
    settings: VertexPublisherSettings,
}

impl VertexPublisher {
    pub fn new(settings: VertexPublisherSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    /// Request body for `models:upload`.
    pub fn model_upload_body(settings: &VertexPublisherSettings, artifact_uri: &str) -> Value {
        json!({
            "model": {
                "displayName": settings.display_name,
                "artifactUri": artifact_uri,
                "containerSpec": { "imageUri": settings.serving_image },
            }
        })
    }

    /// Request body for `endpoints/{id}:deployModel`.
    pub fn deploy_body(settings: &VertexPublisherSettings, model: &str) -> Value {
        json!({
            "deployedModel": {
                "model": model,
                "displayName": settings.display_name,
                "dedicatedResources": {
                    "machineSpec": { "machineType": settings.machine_type },
                    "minReplicaCount": settings.min_replicas,
                    "maxReplicaCount": settings.max_replicas,
                },
            },
            "trafficSplit": { "0": 100 },
        })
    }

    async fn upload_artifact(&self, artifact: &Artifact) -> Result<(), PublishError> {
        let bytes = tokio::fs::read(&artifact.local_path)
            .await
            .map_err(|source| PublishError::Io {
                path: artifact.local_path.clone(),
                source,
            })?;
        let url = format!(
            "{}/upload/storage/v1/b/{}/o",
            self.settings.storage_base_url, self.settings.bucket
        );
        debug!(object = %artifact.object_name, bytes = bytes.len(), "uploading artifact");

        let response = self
            .client
            .post(&url)
            .query(&[("uploadType", "media"), ("name", artifact.object_name.as_str())])
            .bearer_auth(&self.settings.access_token)
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| network(&url, e))?;
        check_status(&url, response).await.map(|_| ())
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, PublishError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.settings.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| network(url, e))?;
        check_status(url, response).await
    }

    async fn get_json(&self, url: &str) -> Result<Value, PublishError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.settings.access_token)
            .send()
            .await
            .map_err(|e| network(url, e))?;
        check_status(url, response).await
    }

    /// Poll a long-running operation until `done`, returning its `response`.
    async fn wait_for_operation(&self, operation: Value) -> Result<Value, PublishError> {
        let name = operation["name"]
            .as_str()
            .ok_or_else(|| PublishError::InvalidResponse(format!("operation without name: {operation}")))?
            .to_string();
        let url = format!("{}/v1/{}", self.settings.vertex_base_url, name);

        let start = Instant::now();
        let initial_delay_ms: u64 = 1000;
        let max_delay_ms: u64 = 30_000;
        let backoff_factor: f64 = 1.5;
        let mut delay_ms = initial_delay_ms;
        let mut current = operation;

        loop {
            if current["done"].as_bool().unwrap_or(false) {
                if let Some(error) = current.get("error") {
                    let message = error["message"].as_str().unwrap_or("unknown").to_string();
                    warn!(operation = %name, %message, "operation failed");
                    return Err(PublishError::OperationFailed { name, message });
                }
                return Ok(current["response"].clone());
            }

            if start.elapsed() > self.settings.operation_timeout {
                return Err(PublishError::OperationTimeout {
                    name,
                    seconds: self.settings.operation_timeout.as_secs(),
                });
            }

            debug!(
                operation = %name,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "waiting for operation"
            );
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            delay_ms = ((delay_ms as f64 * backoff_factor) as u64).min(max_delay_ms);

            current = self.get_json(&url).await?;
        }
    }
}

#[async_trait]
impl ArtifactPublisher for VertexPublisher {
    async fn publish(&self, model_dir: &Path) -> Result<PublishedModel, PublishError> {
        let s = &self.settings;
        let artifacts = collect_artifacts(model_dir, &s.prefix)?;
        let artifact_uri = format!("gs://{}/{}", s.bucket, s.prefix.trim_matches('/'));

        info!(files = artifacts.len(), uri = %artifact_uri, "uploading model artifacts");
        for artifact in &artifacts {
            self.upload_artifact(artifact).await?;
        }

        info!(display_name = %s.display_name, "registering model");
        let url = format!("{}/v1/{}/models:upload", s.vertex_base_url, s.parent());
        let operation = self
            .post_json(&url, &Self::model_upload_body(s, &artifact_uri))
            .await?;
        let response = self.wait_for_operation(operation).await?;
        let model = response["model"]
            .as_str()
            .ok_or_else(|| PublishError::InvalidResponse(format!("upload response without model: {response}")))?
            .to_string();
        info!(%model, "model registered");

        info!("creating endpoint");
        let url = format!("{}/v1/{}/endpoints", s.vertex_base_url, s.parent());
        let operation = self
            .post_json(&url, &json!({ "displayName": format!("{}_endpoint", s.display_name) }))
            .await?;
        let response = self.wait_for_operation(operation).await?;
        let endpoint = response["name"]
            .as_str()
            .ok_or_else(|| PublishError::InvalidResponse(format!("endpoint response without name: {response}")))?
            .to_string();
        info!(%endpoint, "endpoint created");

        info!(machine_type = %s.machine_type, "deploying model to endpoint");
        let url = format!("{}/v1/{}:deployModel", s.vertex_base_url, endpoint);
        let operation = self.post_json(&url, &Self::deploy_body(s, &model)).await?;
        self.wait_for_operation(operation).await?;

        let endpoint_id = resource_id(&endpoint).to_string();
        info!(%endpoint_id, "deployment complete");
        Ok(PublishedModel {
            artifact_uri,
            model,
            endpoint,
            endpoint_id,
        })
    }
}

fn network(url: &str, e: reqwest::Error) -> PublishError {
    PublishError::Network {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

async fn check_status(url: &str, response: reqwest::Response) -> Result<Value, PublishError> {
    let status = response.status().as_u16();
    if !(200..300).contains(&status) {
        let message = response.text().await.unwrap_or_default();
        return Err(PublishError::Api {
            url: url.to_string(),
            status,
            message,
        });
    }
    response
        .json()
        .await
        .map_err(|e| PublishError::InvalidResponse(e.to_string()))
}
