//! Runtime configuration endpoints. Updates are persisted to the TOML
//! document and picked up by the next request.

mod handlers;

use axum::{routing::get, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/config/", get(handlers::get_settings))
        .route(
            "/config/llm",
            get(handlers::get_llm_settings).put(handlers::update_llm_settings),
        )
        .route(
            "/config/tts",
            get(handlers::get_tts_settings).put(handlers::update_tts_settings),
        )
}
