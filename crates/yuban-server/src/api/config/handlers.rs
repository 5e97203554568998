use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use yuban_speech::EmotionAudioMap;

use crate::error::ApiError;
use crate::settings::{LlmSettings, Settings, TtsSettings};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub success: bool,
    pub settings: Settings,
}

#[derive(Debug, Serialize)]
pub struct LlmSettingsResponse {
    pub success: bool,
    pub llm: LlmSettings,
}

#[derive(Debug, Serialize)]
pub struct TtsSettingsResponse {
    pub success: bool,
    pub tts: TtsSettings,
}

/// Partial update; absent fields keep their current values.
#[derive(Debug, Deserialize)]
pub struct UpdateLlmSettingsRequest {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTtsSettingsRequest {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub default_speaker: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub classifier_url: Option<String>,
    #[serde(default)]
    pub emotion_audio: Option<EmotionAudioMap>,
}

pub async fn get_settings(
    State(state): State<AppState>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let settings = load(&state).await?;
    Ok(Json(SettingsResponse {
        success: true,
        settings,
    }))
}

pub async fn get_llm_settings(
    State(state): State<AppState>,
) -> Result<Json<LlmSettingsResponse>, ApiError> {
    let settings = load(&state).await?;
    Ok(Json(LlmSettingsResponse {
        success: true,
        llm: settings.llm,
    }))
}

pub async fn update_llm_settings(
    State(state): State<AppState>,
    Json(request): Json<UpdateLlmSettingsRequest>,
) -> Result<Json<LlmSettingsResponse>, ApiError> {
    let mut settings = load(&state).await?;
    if let Some(base_url) = request.base_url {
        settings.llm.base_url = base_url;
    }
    if let Some(default_model) = request.default_model {
        settings.llm.default_model = default_model;
    }
    if let Some(timeout_secs) = request.timeout_secs {
        settings.llm.timeout_secs = timeout_secs;
    }

    save(&state, settings.clone()).await?;
    info!(model = %settings.llm.default_model, "LLM settings updated");
    Ok(Json(LlmSettingsResponse {
        success: true,
        llm: settings.llm,
    }))
}

pub async fn get_tts_settings(
    State(state): State<AppState>,
) -> Result<Json<TtsSettingsResponse>, ApiError> {
    let settings = load(&state).await?;
    Ok(Json(TtsSettingsResponse {
        success: true,
        tts: settings.tts,
    }))
}

pub async fn update_tts_settings(
    State(state): State<AppState>,
    Json(request): Json<UpdateTtsSettingsRequest>,
) -> Result<Json<TtsSettingsResponse>, ApiError> {
    let mut settings = load(&state).await?;
    if let Some(base_url) = request.base_url {
        settings.tts.base_url = base_url;
    }
    if let Some(default_speaker) = request.default_speaker {
        settings.tts.default_speaker = default_speaker;
    }
    if let Some(timeout_secs) = request.timeout_secs {
        settings.tts.timeout_secs = timeout_secs;
    }
    if let Some(classifier_url) = request.classifier_url {
        settings.tts.classifier_url = if classifier_url.trim().is_empty() {
            None
        } else {
            Some(classifier_url)
        };
    }
    if let Some(emotion_audio) = request.emotion_audio {
        settings.tts.emotion_audio = emotion_audio;
    }

    save(&state, settings.clone()).await?;
    info!(engine = %settings.tts.base_url, "TTS settings updated");
    Ok(Json(TtsSettingsResponse {
        success: true,
        tts: settings.tts,
    }))
}

async fn load(state: &AppState) -> Result<Settings, ApiError> {
    state
        .settings
        .load()
        .await
        .map_err(|err| ApiError::internal(format!("Failed to load settings: {err}")))
}

async fn save(state: &AppState, settings: Settings) -> Result<(), ApiError> {
    state
        .settings
        .save(settings)
        .await
        .map_err(|err| ApiError::internal(format!("Failed to save settings: {err}")))
}
