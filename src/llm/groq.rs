// SPDX-License-Identifier: MIT

//! Groq model - OpenAI-compatible chat completions implementation

use super::{GenerationConfig, Model, ModelError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;
use std::time::Duration;

/// Groq chat model implementation
pub struct GroqModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl GroqModel {
    /// Create a new GroqModel
    ///
    /// Requires `GROQ_API_KEY` environment variable to be set.
    /// Optionally uses `GROQ_BASE_URL` for custom endpoints. The request
    /// timeout bounds every call; a hung backend fails instead of blocking
    /// the pipeline indefinitely.
    pub fn new(model_name: impl Into<String>, timeout: Duration) -> Result<Self, ModelError> {
        let api_key =
            env::var("GROQ_API_KEY").map_err(|_| ModelError::ApiKeyMissing("GROQ_API_KEY".into()))?;
        let base_url = env::var("GROQ_BASE_URL")
            .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string());
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            model_name: model_name.into(),
            base_url,
        })
    }

    /// Extract the first choice's message content from a chat response
    fn parse_response(response: &serde_json::Value) -> Result<String, ModelError> {
        response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .and_then(|c| c["message"]["content"].as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ModelError::Backend("no choices in chat response".to_string()))
    }
}

#[async_trait]
impl Model for GroqModel {
    async fn generate(
        &self,
        prompt: &str,
        config: Option<&GenerationConfig>,
    ) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = json!({
            "model": self.model_name,
            "messages": [{"role": "user", "content": prompt}]
        });

        if let Some(cfg) = config {
            if let Some(temp) = cfg.temperature {
                body["temperature"] = json!(temp);
            }
            if let Some(max_tokens) = cfg.max_output_tokens {
                body["max_tokens"] = json!(max_tokens);
            }
        }

        log::debug!("Groq request to {} with model {}", url, self.model_name);

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
                "Groq API error ({status}): {text}"
            )));
        }

        let resp_json: serde_json::Value = resp.json().await?;
        Self::parse_response(&resp_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_chat_response() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "{\"summary\": \"ok\"}"
                }
            }]
        });

        let text = GroqModel::parse_response(&response).unwrap();
        assert_eq!(text, "{\"summary\": \"ok\"}");
    }

    #[test]
    fn test_parse_response_without_choices_is_backend_error() {
        let response = json!({"error": {"message": "overloaded"}});
        let result = GroqModel::parse_response(&response);
        assert!(matches!(result, Err(ModelError::Backend(_))));
    }

    #[test]
    fn test_parse_response_with_null_content_is_backend_error() {
        let response = json!({"choices": [{"message": {"content": null}}]});
        assert!(GroqModel::parse_response(&response).is_err());
    }
}
