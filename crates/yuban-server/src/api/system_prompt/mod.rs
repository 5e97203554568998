//! System prompt management endpoints.

mod handlers;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/system-prompt/",
            get(handlers::list_prompts).post(handlers::create_prompt),
        )
        .route("/system-prompt/active", get(handlers::get_active_prompt))
        .route(
            "/system-prompt/{prompt_id}",
            put(handlers::update_prompt).delete(handlers::delete_prompt),
        )
        .route(
            "/system-prompt/{prompt_id}/activate",
            post(handlers::activate_prompt),
        )
}
