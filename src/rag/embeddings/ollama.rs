//! Ollama embedding client.
//!
//! Tries the current `/api/embed` endpoint (`{model, input}` →
//! `{embeddings: [[..]]}`) and falls back to the legacy `/api/embeddings`
//! endpoint (`{model, prompt}` → `{embedding: [..]}`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::EmbeddingService;
use crate::error::EmbeddingError;

#[derive(Debug, Clone)]
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaEmbedding {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn embed_current(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embed", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&json!({ "model": self.model, "input": text }))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let v: Value = resp.json().await?;
        // some Ollama versions answer with a singular "embedding" here too
        let vector = v["embeddings"]
            .as_array()
            .and_then(|all| all.first())
            .and_then(|first| first.as_array())
            .or_else(|| v["embedding"].as_array())
            .map(|values| to_vector(values))
            .unwrap_or_default();

        if vector.is_empty() {
            return Err(EmbeddingError::Empty(self.model.clone()));
        }
        Ok(vector)
    }

    async fn embed_legacy(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&json!({ "model": self.model, "prompt": text }))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let v: Value = resp.json().await?;
        let vector = v["embedding"]
            .as_array()
            .map(|values| to_vector(values))
            .unwrap_or_default();

        if vector.is_empty() {
            return Err(EmbeddingError::Empty(self.model.clone()));
        }
        Ok(vector)
    }
}

fn to_vector(values: &[Value]) -> Vec<f32> {
    values
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

#[async_trait]
impl EmbeddingService for OllamaEmbedding {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        match self.embed_current(text).await {
            Ok(vector) => Ok(vector),
            Err(EmbeddingError::Api { status: 404, body })
                if body.contains("not found") || body.contains("does not exist") =>
            {
                // model missing, not an old server: the legacy endpoint won't help
                Err(EmbeddingError::Api { status: 404, body })
            }
            Err(e) => {
                log::debug!("/api/embed failed ({}), trying /api/embeddings", e);
                self.embed_legacy(text).await
            }
        }
    }
}
