//! Conversational chat endpoints backed by the conversation store.

mod handlers;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat/send", post(handlers::send_message))
        .route("/chat/history", get(handlers::get_history))
        .route("/chat/conversations", get(handlers::list_conversations))
        .route(
            "/chat/conversations/{conversation_id}",
            axum::routing::delete(handlers::delete_conversation),
        )
        .route(
            "/chat/conversations/{conversation_id}/messages",
            get(handlers::get_conversation_messages),
        )
        .route(
            "/chat/conversations/{conversation_id}/export",
            post(handlers::export_conversation),
        )
        .route("/chat/stats", get(handlers::get_stats))
}
