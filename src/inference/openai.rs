// SPDX-License-Identifier: MIT

//! OpenAI-backed inference: chat completions and embeddings.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::env;

use super::{Inference, InferenceError};
use crate::config::InferenceConfig;

/// Chat plus embeddings client for the OpenAI API.
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    model: String,
    embedding_model: String,
    base_url: String,
}

impl OpenAiBackend {
    /// Build from config. The API key comes from the environment variable
    /// named in `config.api_key_env`; `OPENAI_BASE_URL` overrides the
    /// endpoint when no base URL is configured.
    pub fn from_config(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let api_key = env::var(&config.api_key_env)
            .map_err(|_| InferenceError::ApiKeyMissing(config.api_key_env.clone()))?;
        let base_url = config
            .base_url
            .clone()
            .or_else(|| env::var("OPENAI_BASE_URL").ok())
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: Client::new(),
            api_key,
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            base_url,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, InferenceError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| InferenceError::api("openai", e.to_string(), true))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let retryable = status.as_u16() == 429 || status.is_server_error();
            return Err(InferenceError::api(
                "openai",
                format!("HTTP {}: {}", status, text),
                retryable,
            ));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| InferenceError::invalid("openai", e.to_string()))
    }

    /// First choice's message text.
    fn parse_completion(response: &Value) -> Result<String, InferenceError> {
        response["choices"]
            .as_array()
            .and_then(|choices| choices.first())
            .and_then(|choice| choice["message"]["content"].as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| InferenceError::invalid("openai", "no completion choices"))
    }

    /// First embedding vector.
    fn parse_embedding(response: &Value) -> Result<Vec<f32>, InferenceError> {
        let values = response["data"]
            .as_array()
            .and_then(|data| data.first())
            .and_then(|item| item["embedding"].as_array())
            .ok_or_else(|| InferenceError::invalid("openai", "no embedding data"))?;

        values
            .iter()
            .map(|v| {
                v.as_f64().map(|f| f as f32).ok_or_else(|| {
                    InferenceError::invalid("openai", "non-numeric embedding component")
                })
            })
            .collect()
    }
}

#[async_trait]
impl Inference for OpenAiBackend {
    async fn complete(&self, prompt: &str, context: &str) -> Result<String, InferenceError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt },
                { "role": "user", "content": context }
            ]
        });

        log::debug!(
            "OpenAI completion request with {} chars of context",
            context.len()
        );
        let response = self.post("/chat/completions", &body).await?;
        Self::parse_completion(&response)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let body = json!({
            "model": self.embedding_model,
            "input": text
        });

        let response = self.post("/embeddings", &body).await?;
        Self::parse_embedding(&response)
    }
}
