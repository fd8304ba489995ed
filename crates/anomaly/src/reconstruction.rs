//! The autoencoder behind a prediction endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use playwatch_core::{Config, ConfigError};

use crate::features::FeatureVector;

/// Errors returned by a reconstruction oracle.
#[derive(Debug, thiserror::Error)]
pub enum ReconstructionError {
    #[error("prediction request failed: {0}")]
    Network(String),

    #[error("prediction endpoint returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected prediction response: {0}")]
    InvalidResponse(String),

    #[error("prediction timed out after {0:?}")]
    Timeout(Duration),
}

/// Reconstructs a normalized feature vector. A well-trained autoencoder
/// returns something close to its input for normal behavior.
#[async_trait]
pub trait ReconstructionOracle: Send + Sync {
    async fn infer(&self, normalized: &FeatureVector) -> Result<Vec<f64>, ReconstructionError>;
}

/// Vertex AI online prediction client for a deployed autoencoder.
pub struct VertexEndpointClient {
    client: reqwest::Client,
    predict_url: String,
    access_token: String,
    timeout: Duration,
}

impl VertexEndpointClient {
    pub fn new(predict_url: String, access_token: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            predict_url,
            access_token,
            timeout,
        }
    }

    /// Build the client from `gcp` and `endpoint` config sections.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let project = config.gcp.require_project_id()?;
        let token = config.gcp.require_access_token()?;
        let endpoint_id = config.endpoint.require_endpoint_id()?;
        let url = predict_url(
            config.endpoint.base_url.as_deref(),
            project,
            &config.gcp.location,
            endpoint_id,
        );
        Ok(Self::new(
            url,
            token.to_string(),
            Duration::from_secs(config.endpoint.timeout_secs),
        ))
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }
}

/// `https://{location}-aiplatform.googleapis.com/v1/projects/{project}/locations/{location}/endpoints/{id}:predict`
pub fn predict_url(
    base_url: Option<&str>,
    project: &str,
    location: &str,
    endpoint_id: &str,
) -> String {
    let base = base_url
        .map(|b| b.trim_end_matches('/').to_string())
        .unwrap_or_else(|| format!("https://{location}-aiplatform.googleapis.com"));
    format!(
        "{base}/v1/projects/{project}/locations/{location}/endpoints/{endpoint_id}:predict"
    )
}

/// Pull `predictions[0]` out of a predict response as a numeric vector.
pub(crate) fn parse_prediction(body: &Value) -> Result<Vec<f64>, ReconstructionError> {
    let first = body["predictions"]
        .as_array()
        .and_then(|p| p.first())
        .ok_or_else(|| ReconstructionError::InvalidResponse("no predictions returned".into()))?;

    let values = first.as_array().ok_or_else(|| {
        ReconstructionError::InvalidResponse(format!("prediction is not an array: {first}"))
    })?;

    values
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                ReconstructionError::InvalidResponse(format!("non-numeric prediction value {v}"))
            })
        })
        .collect()
}

#[async_trait]
impl ReconstructionOracle for VertexEndpointClient {
    async fn infer(&self, normalized: &FeatureVector) -> Result<Vec<f64>, ReconstructionError> {
        let body = json!({ "instances": [normalized] });
        debug!(url = %self.predict_url, input = %normalized, "requesting reconstruction");

        let request = self
            .client
            .post(&self.predict_url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send();

        let response = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ReconstructionError::Network(e.to_string())),
            Err(_) => return Err(ReconstructionError::Timeout(self.timeout)),
        };

        let status = response.status().as_u16();
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            return Err(ReconstructionError::Api { status, message });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ReconstructionError::InvalidResponse(e.to_string()))?;
        parse_prediction(&payload)
    }
}

/// Test oracles.
#[cfg(any(test, feature = "test-utils"))]
pub mod fixed {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns its input unchanged: a perfect autoencoder.
    #[derive(Default)]
    pub struct IdentityOracle {
        calls: AtomicUsize,
    }

    impl IdentityOracle {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReconstructionOracle for IdentityOracle {
        async fn infer(
            &self,
            normalized: &FeatureVector,
        ) -> Result<Vec<f64>, ReconstructionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(normalized.iter().collect())
        }
    }

    /// Always returns the same reconstruction, whatever the input.
    pub struct ConstantOracle(pub Vec<f64>);

    #[async_trait]
    impl ReconstructionOracle for ConstantOracle {
        async fn infer(
            &self,
            _normalized: &FeatureVector,
        ) -> Result<Vec<f64>, ReconstructionError> {
            Ok(self.0.clone())
        }
    }

    /// Endpoint that is always down.
    pub struct UnavailableOracle;

    #[async_trait]
    impl ReconstructionOracle for UnavailableOracle {
        async fn infer(
            &self,
            _normalized: &FeatureVector,
        ) -> Result<Vec<f64>, ReconstructionError> {
            Err(ReconstructionError::Api {
                status: 503,
                message: "endpoint has no deployed model".into(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_url_default_host() {
        let url = predict_url(None, "cloud-sa-ml", "us-central1", "4701642562253881344");
        assert_eq!(
            url,
            "https://us-central1-aiplatform.googleapis.com/v1/projects/cloud-sa-ml/locations/us-central1/endpoints/4701642562253881344:predict"
        );
    }

    #[test]
    fn test_predict_url_override() {
        let url = predict_url(Some("http://localhost:8080/"), "p", "europe-west4", "42");
        assert_eq!(
            url,
            "http://localhost:8080/v1/projects/p/locations/europe-west4/endpoints/42:predict"
        );
    }

    #[test]
    fn test_parse_prediction() {
        let body = json!({"predictions": [[0.1, -0.2, 0.0, 3.5]], "deployedModelId": "1"});
        assert_eq!(parse_prediction(&body).unwrap(), vec![0.1, -0.2, 0.0, 3.5]);
    }

    #[test]
    fn test_parse_prediction_errors() {
        assert!(parse_prediction(&json!({"predictions": []})).is_err());
        assert!(parse_prediction(&json!({"predictions": [{"x": 1}]})).is_err());
        assert!(parse_prediction(&json!({"predictions": [[1.0, "two"]]})).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let client = VertexEndpointClient::new(
            "http://127.0.0.1:1/v1/projects/p/locations/l/endpoints/e:predict".into(),
            "token".into(),
            Duration::from_secs(5),
        );
        let err = client
            .infer(&FeatureVector::new(0.0, 0.0, 0.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconstructionError::Network(_)));
    }
}
