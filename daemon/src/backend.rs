//! REST client for the training/inference backend.
//!
//! Every operation is a single HTTP call. Nothing here retries; callers decide what a failure
//! means.

use async_trait::async_trait;
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::Deserialize;
use shared::{Capture, CaptureError, Model, Prediction, SamplesSummary};

/// Errors from the backend REST layer.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The HTTP request itself failed (connection refused, DNS, TLS, body decoding).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("backend returned {status}: {detail}")]
    Api { status: u16, detail: String },

    #[error("invalid backend URL: {0}")]
    InvalidUrl(String),
}

impl From<RemoteError> for CaptureError {
    fn from(err: RemoteError) -> Self {
        CaptureError::Remote(err.to_string())
    }
}

/// The remote operations the capture pipeline consumes.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn upload(&self, capture: &Capture) -> Result<(), RemoteError>;
    async fn list_samples(&self) -> Result<SamplesSummary, RemoteError>;
    async fn clear_samples(&self) -> Result<(), RemoteError>;
    async fn train(&self, name: &str) -> Result<Model, RemoteError>;
    async fn list_models(&self) -> Result<Vec<Model>, RemoteError>;
    async fn delete_model(&self, name: &str) -> Result<(), RemoteError>;
    /// Callers must only invoke this with at least one hand in view.
    async fn predict(
        &self,
        image: Vec<u8>,
        model: &str,
        hands_detected: u32,
    ) -> Result<Prediction, RemoteError>;
}

/// HTTP client for the backend at `base_url`, e.g. `http://127.0.0.1:8000`.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<Model>,
}

#[derive(Debug, Deserialize)]
struct TrainResponse {
    name: Option<String>,
    #[serde(default)]
    accuracy: f32,
    #[serde(default)]
    n_samples: u64,
    #[serde(default)]
    classes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    prediction: String,
    confidence: f32,
    #[serde(default)]
    all_predictions: Vec<(String, f32)>,
}

impl PredictResponse {
    fn into_prediction(self) -> Prediction {
        let mut alternatives = self.all_predictions;
        alternatives.sort_by(|a, b| b.1.total_cmp(&a.1));
        Prediction {
            label: self.prediction,
            confidence: self.confidence,
            alternatives,
        }
    }
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, RemoteError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| RemoteError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self { client, base_url })
    }

    /// Builds `<base>/api/<segments...>`, escaping each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| RemoteError::InvalidUrl(self.base_url.to_string()))?;
            path.pop_if_empty().push("api");
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn jpeg_part(image: Vec<u8>, file_name: String) -> Result<Part, RemoteError> {
        Ok(Part::bytes(image).file_name(file_name).mime_str("image/jpeg")?)
    }

    /// Returns the response if its status is 2xx, otherwise an [`RemoteError::Api`] carrying
    /// the backend's `detail` message (or the raw body if there is none).
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(RemoteError::Api {
            status: status.as_u16(),
            detail: error_detail(&body),
        })
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), RemoteError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

/// Extracts `detail` from an error body like `{"detail": "..."}`.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => match map.get("detail") {
            Some(serde_json::Value::String(detail)) => detail.clone(),
            Some(other) => other.to_string(),
            None => body.to_string(),
        },
        _ => body.to_string(),
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn upload(&self, capture: &Capture) -> Result<(), RemoteError> {
        debug!(
            "Uploading {} ({} bytes, label {})",
            capture.file_name(),
            capture.image.len(),
            capture.label
        );
        let form = Form::new()
            .text("label", capture.label.clone())
            .part(
                "file",
                Self::jpeg_part(capture.image.clone(), capture.file_name())?,
            )
            .text("hands_detected", capture.hands_detected_at_capture.to_string())
            .text("category", capture.category.clone());

        let response = self
            .client
            .post(self.endpoint(&["upload_sample"])?)
            .multipart(form)
            .send()
            .await?;

        Self::check_status(response).await
    }

    async fn list_samples(&self) -> Result<SamplesSummary, RemoteError> {
        let response = self.client.get(self.endpoint(&["samples"])?).send().await?;
        Self::parse_response(response).await
    }

    async fn clear_samples(&self) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.endpoint(&["clear_samples"])?)
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn train(&self, name: &str) -> Result<Model, RemoteError> {
        let form = Form::new().text("name", name.to_string());
        let response = self
            .client
            .post(self.endpoint(&["train"])?)
            .multipart(form)
            .send()
            .await?;

        let trained: TrainResponse = Self::parse_response(response).await?;
        Ok(Model {
            name: trained.name.unwrap_or_else(|| name.to_string()),
            accuracy: trained.accuracy,
            n_samples: trained.n_samples,
            classes: trained.classes,
        })
    }

    async fn list_models(&self) -> Result<Vec<Model>, RemoteError> {
        let response = self.client.get(self.endpoint(&["models"])?).send().await?;
        let models: ModelsResponse = Self::parse_response(response).await?;
        Ok(models.models)
    }

    async fn delete_model(&self, name: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.endpoint(&["model", name])?)
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn predict(
        &self,
        image: Vec<u8>,
        model: &str,
        hands_detected: u32,
    ) -> Result<Prediction, RemoteError> {
        let form = Form::new()
            .part("file", Self::jpeg_part(image, "frame.jpg".to_string())?)
            .text("model", model.to_string())
            .text("hands_detected", hands_detected.to_string());

        let response = self
            .client
            .post(self.endpoint(&["predict"])?)
            .multipart(form)
            .send()
            .await?;

        let predicted: PredictResponse = Self::parse_response(response).await?;
        Ok(predicted.into_prediction())
    }
}
