use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Fixed sampling configuration applied to every reply generation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub top_p: f32,
    /// Response length cap in tokens (`num_predict` on the Ollama wire).
    pub max_tokens: usize,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub user_prompt: String,
    pub system_prompt: Option<String>,
    pub options: SamplingOptions,
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Obtain a single non-streamed completion. An empty string means the
    /// backend answered but produced no text.
    async fn generate(&self, request: GenerateRequest) -> Result<String>;
}
