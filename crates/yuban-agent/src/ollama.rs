//! Ollama `/api/generate` adapter.

use crate::errors::{AgentError, Result};
use crate::model::{GenerateRequest, LlmBackend};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    num_predict: usize,
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

/// HTTP adapter for a local Ollama instance. One instance per request is
/// fine; the client is cheap relative to the generation call behind it.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .map_err(|err| AgentError::Backend(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt: &request.user_prompt,
            system: request.system_prompt.as_deref(),
            stream: false,
            options: OllamaOptions {
                temperature: request.options.temperature,
                top_p: request.options.top_p,
                num_predict: request.options.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|err| AgentError::Backend(format!("Ollama request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Backend(format!(
                "Ollama returned status {status}"
            )));
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|err| AgentError::Backend(format!("Invalid Ollama response: {err}")))?;

        Ok(parsed.response)
    }
}
