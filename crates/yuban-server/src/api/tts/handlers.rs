use axum::{
    extract::{Extension, Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use yuban_speech::{EmotionAudioMap, SynthesisOutcome, SynthesisRequest};

use crate::api::request_context::RequestContext;
use crate::error::ApiError;
use crate::state::AppState;

const OUTPUT_DIR_ENV: &str = "YUBAN_TTS_OUTPUT_DIR";
const DEFAULT_OUTPUT_DIR: &str = "outputs";

#[derive(Debug, Serialize)]
pub struct VoicesResponse {
    pub success: bool,
    pub default_speaker: String,
    pub emotion_audio: EmotionAudioMap,
}

#[derive(Debug, Serialize)]
pub struct EngineHealthResponse {
    pub success: bool,
    pub engine_url: String,
    pub healthy: bool,
}

/// Emotion-aware synthesis. The pipeline is total: engine and classifier
/// failures come back as a `success:false` outcome, not an error status.
pub async fn synthesize(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    Json(request): Json<SynthesisRequest>,
) -> Result<Json<SynthesisOutcome>, ApiError> {
    let _permit = state.acquire_permit().await;

    if request.text.trim().is_empty() {
        return Err(ApiError::bad_request("合成文本不能为空"));
    }

    let orchestrator = state
        .tts_orchestrator()
        .await
        .map_err(|err| ApiError::internal(format!("Failed to prepare TTS pipeline: {err}")))?;
    let outcome = orchestrator.synthesize(request).await;
    info!(
        correlation_id = %context.correlation_id,
        success = outcome.success,
        "Speech synthesis finished"
    );
    Ok(Json(outcome))
}

/// Serves a previously synthesized clip by its bare filename. The name
/// must not address outside the output directory.
pub async fn download_audio(
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(ApiError::bad_request("非法的文件名"));
    }

    let output_dir = std::env::var(OUTPUT_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_OUTPUT_DIR));
    let audio_path = output_dir.join(&filename);

    let bytes = tokio::fs::read(&audio_path)
        .await
        .map_err(|_| ApiError::not_found("音频文件不存在"))?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}

/// The configured voice inventory: the default speaker clip and the
/// per-emotion reference clips.
pub async fn list_voices(
    State(state): State<AppState>,
) -> Result<Json<VoicesResponse>, ApiError> {
    let settings = state
        .settings
        .load()
        .await
        .map_err(|err| ApiError::internal(format!("Failed to load settings: {err}")))?;

    Ok(Json(VoicesResponse {
        success: true,
        default_speaker: settings.tts.default_speaker,
        emotion_audio: settings.tts.emotion_audio,
    }))
}

pub async fn engine_health(
    State(state): State<AppState>,
) -> Result<Json<EngineHealthResponse>, ApiError> {
    let settings = state
        .settings
        .load()
        .await
        .map_err(|err| ApiError::internal(format!("Failed to load settings: {err}")))?;
    let orchestrator = state
        .tts_orchestrator_with(&settings)
        .map_err(|err| ApiError::internal(format!("Failed to prepare TTS pipeline: {err}")))?;

    Ok(Json(EngineHealthResponse {
        success: true,
        engine_url: settings.tts.base_url,
        healthy: orchestrator.engine_healthy().await,
    }))
}
