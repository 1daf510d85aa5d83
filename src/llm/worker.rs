//! HTTP client for the external model worker.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::errors::AppError;

use super::provider::{EmbeddingBackend, GenerationBackend};

/// Client for the model worker that serves both the generation and the
/// embedding endpoints.
#[derive(Clone)]
pub struct WorkerClient {
    base_url: String,
    client: Client,
}

impl WorkerClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        let res = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(AppError::internal)?;
        if !res.status().is_success() {
            return Err(AppError::Internal(format!(
                "worker health check returned {}",
                res.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl GenerationBackend for WorkerClient {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String, AppError> {
        let res = self
            .client
            .post(format!("{}/generate_stream", self.base_url))
            .json(&json!({ "user_msg": prompt, "model": model }))
            .send()
            .await
            .map_err(AppError::generation)?;
        if !res.status().is_success() {
            return Err(AppError::GenerationFailure(format!(
                "worker returned {}",
                res.status()
            )));
        }

        res.text().await.map_err(AppError::generation)
    }
}

#[async_trait]
impl EmbeddingBackend for WorkerClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let res = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&json!({ "input": text }))
            .send()
            .await
            .map_err(AppError::internal)?;
        if !res.status().is_success() {
            return Err(AppError::Internal(format!(
                "embedding endpoint returned {}",
                res.status()
            )));
        }

        let payload: Value = res.json().await.map_err(AppError::internal)?;
        let values = payload
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                AppError::Internal("embedding response missing 'embedding' array".to_string())
            })?;

        values
            .iter()
            .map(|v| {
                v.as_f64().map(|f| f as f32).ok_or_else(|| {
                    AppError::Internal("non-numeric value in embedding array".to_string())
                })
            })
            .collect()
    }
}
