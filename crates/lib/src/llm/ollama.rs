//! Ollama API client (http://localhost:11434 by default).
//! Supports listing models and streaming generation (NDJSON).

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use super::{ByteStream, GenerationBackend, LlmError};
use crate::config::DEFAULT_BASE_URL;

/// Client for Ollama HTTP API.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /api/tags — list available models.
    pub async fn list_models(&self) -> Result<Vec<OllamaModel>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{} {}", status, body)));
        }
        let data: TagsResponse = res.json().await?;
        Ok(data.models.unwrap_or_default())
    }

    /// POST /api/generate with stream: true. Returns the NDJSON body as a byte stream once
    /// the service accepted the request; decoding is left to the caller.
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<ByteStream, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: true,
        };
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{} {}", status, body)));
        }
        Ok(Box::pin(res.bytes_stream().map(|chunk| chunk.map_err(LlmError::Request))))
    }
}

#[async_trait]
impl GenerationBackend for OllamaClient {
    async fn generate_stream(&self, model: &str, prompt: &str) -> Result<ByteStream, LlmError> {
        self.generate(model, prompt).await
    }
}

/// Request body for POST /api/generate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
}

/// One line of the generate stream. Both fields are optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationChunk {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaModel {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl OllamaModel {
    /// True when `model` names this model, allowing the implicit `:latest` tag.
    pub fn matches(&self, model: &str) -> bool {
        self.name == model
            || self.name.strip_suffix(":latest") == Some(model)
            || model.strip_suffix(":latest") == Some(self.name.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Option<Vec<OllamaModel>>,
}
