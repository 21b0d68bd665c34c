//! Generative-model client.
//!
//! The prompt call is the expensive, failure-prone operation of a
//! pipeline and may legitimately run for minutes; the client therefore
//! imposes no request timeout. Failures surface as [`EngineError`] and
//! drive the executor's retry path.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::AppConfig;
use crate::error::EngineError;

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, EngineError>;
}

pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f64,
    top_p: f64,
    max_tokens: i64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaClient {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: cfg.ollama_host.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            max_tokens: cfg.max_tokens,
        }
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, EngineError> {
        let url = format!("{}/api/generate", self.base_url);
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "top_p": self.top_p,
                "num_predict": self.max_tokens,
            }
        });

        debug!(chars = prompt.len(), "sending prompt to backend");
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EngineError::Backend(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Backend(format!(
                "API error: {}",
                status.as_u16()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Backend(format!("failed to decode response: {e}")))?;

        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "backend responded");
        Ok(body.response)
    }
}
