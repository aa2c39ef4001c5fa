// SPDX-License-Identifier: MIT

//! Embeddings backend for the ingestion stage

use super::ModelError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;
use std::time::Duration;

/// Embedding backend trait. The ingestion stage only depends on this seam,
/// so tests can substitute a deterministic embedder.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError>;
}

/// OpenAI-compatible `/embeddings` client
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl OpenAiEmbedder {
    /// Requires `OPENAI_API_KEY`; `OPENAI_BASE_URL` overrides the endpoint.
    pub fn new(model_name: impl Into<String>, timeout: Duration) -> Result<Self, ModelError> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| ModelError::ApiKeyMissing("OPENAI_API_KEY".into()))?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            model_name: model_name.into(),
            base_url,
        })
    }

    fn parse_response(response: &serde_json::Value) -> Result<Vec<Vec<f32>>, ModelError> {
        let data = response["data"]
            .as_array()
            .ok_or_else(|| ModelError::Backend("no data in embeddings response".to_string()))?;

        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            let embedding = item["embedding"]
                .as_array()
                .ok_or_else(|| ModelError::Backend("missing embedding vector".to_string()))?;
            let vector: Vec<f32> = embedding
                .iter()
                .filter_map(|v| v.as_f64())
                .map(|v| v as f32)
                .collect();
            if vector.len() != embedding.len() {
                return Err(ModelError::Backend(
                    "non-numeric value in embedding vector".to_string(),
                ));
            }
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let body = json!({
            "model": self.model_name,
            "input": texts,
        });

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ModelError::Backend(format!(
                "Embeddings API error ({status}): {text}"
            )));
        }

        let resp_json: serde_json::Value = resp.json().await?;
        let vectors = Self::parse_response(&resp_json)?;

        if vectors.len() != texts.len() {
            return Err(ModelError::Backend(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}
