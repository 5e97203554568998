//! TTS orchestration: resolve speaker/emotion prompts, call the engine,
//! and normalize the result envelope.

use crate::error::{Result, SpeechError};
use crate::selector::EmotionAudioSelector;
use crate::Emotion;
use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const ENGINE_FAILURE_MESSAGE: &str = "TTS合成失败";

/// Caller-facing synthesis request. Unset fields are resolved from
/// configuration (speaker), classification (emotion clip), or fabricated
/// (output path).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    #[serde(default)]
    pub speaker_audio: Option<String>,
    #[serde(default)]
    pub emotion_audio: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
}

/// Normalized synthesis result. `output_path` is reduced to the bare
/// filename so the response never leaks the engine's storage layout.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SynthesisOutcome {
    fn failure(emotion: Option<Emotion>, error: String) -> Self {
        Self {
            success: false,
            output_path: None,
            audio_url: None,
            emotion,
            error: Some(error),
        }
    }
}

/// Wire request for the external synthesis engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineRequest {
    pub text: String,
    pub audio_prompt: String,
    pub emo_audio_prompt: Option<String>,
    pub output_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[async_trait]
pub trait TtsBackend: Send + Sync {
    async fn synthesize(&self, request: EngineRequest) -> Result<EngineResponse>;

    /// Engine liveness probe. Adapters without one report healthy.
    async fn health(&self) -> bool {
        true
    }
}

/// HTTP adapter for the IndexTTS engine's `POST /tts/generate` endpoint.
pub struct IndexTtsBackend {
    client: reqwest::Client,
    base_url: String,
}

impl IndexTtsBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .map_err(|err| SpeechError::Engine(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TtsBackend for IndexTtsBackend {
    async fn synthesize(&self, request: EngineRequest) -> Result<EngineResponse> {
        let response = self
            .client
            .post(format!("{}/tts/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|err| SpeechError::Engine(format!("TTS request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::Engine(format!(
                "TTS engine returned status {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|err| SpeechError::Engine(format!("Invalid TTS engine response: {err}")))
    }

    async fn health(&self) -> bool {
        match self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!("TTS engine health probe failed: {err}");
                false
            }
        }
    }
}

pub struct TtsOrchestrator {
    selector: EmotionAudioSelector,
    backend: Arc<dyn TtsBackend>,
    default_speaker: String,
}

impl TtsOrchestrator {
    pub fn new(
        selector: EmotionAudioSelector,
        backend: Arc<dyn TtsBackend>,
        default_speaker: impl Into<String>,
    ) -> Self {
        Self {
            selector,
            backend,
            default_speaker: default_speaker.into(),
        }
    }

    pub async fn engine_healthy(&self) -> bool {
        self.backend.health().await
    }

    /// Full synthesis pipeline. Never returns an error: every adapter
    /// failure collapses into a `success:false` outcome.
    pub async fn synthesize(&self, request: SynthesisRequest) -> SynthesisOutcome {
        let speaker_audio = request
            .speaker_audio
            .filter(|path| !path.trim().is_empty())
            .unwrap_or_else(|| self.default_speaker.clone());

        let (emotion, emo_audio_prompt) = match request.emotion_audio {
            Some(explicit) if !explicit.trim().is_empty() => (None, Some(explicit)),
            _ => {
                let emotion = self.selector.classify(&request.text).await;
                let clip = self
                    .selector
                    .select(emotion)
                    .clip_path()
                    .map(|path| path.to_string_lossy().into_owned());
                debug!(emotion = emotion.label_zh(), clip = ?clip, "Resolved emotion clip");
                (Some(emotion), clip)
            }
        };

        let output_path = request
            .output_path
            .filter(|path| !path.trim().is_empty())
            .unwrap_or_else(|| {
                format!("outputs/{}.wav", Local::now().format("%Y%m%d%H%M%S"))
            });

        let engine_request = EngineRequest {
            text: request.text,
            audio_prompt: speaker_audio,
            emo_audio_prompt,
            output_path: output_path.clone(),
        };

        match self.backend.synthesize(engine_request).await {
            Ok(response) if response.success => {
                let filename = bare_filename(response.output_path.as_deref().unwrap_or(&output_path));
                SynthesisOutcome {
                    success: true,
                    audio_url: Some(format!("/api/tts/download/{filename}")),
                    output_path: Some(filename),
                    emotion,
                    error: None,
                }
            }
            Ok(response) => SynthesisOutcome::failure(
                emotion,
                response
                    .error
                    .unwrap_or_else(|| ENGINE_FAILURE_MESSAGE.to_string()),
            ),
            Err(err) => {
                warn!(error = %err, "TTS engine call failed");
                SynthesisOutcome::failure(emotion, err.to_string())
            }
        }
    }
}

fn bare_filename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
