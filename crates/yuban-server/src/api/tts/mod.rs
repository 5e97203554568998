//! Speech synthesis endpoints.

mod handlers;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tts/synthesize", post(handlers::synthesize))
        .route("/tts/download/{filename}", get(handlers::download_audio))
        .route("/tts/voices", get(handlers::list_voices))
        .route("/tts/health", get(handlers::engine_health))
}
