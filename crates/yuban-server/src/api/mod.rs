//! API routes and handlers

pub mod chat;
pub mod config;
pub mod internal;
pub mod request_context;
mod router;
pub mod system_prompt;
pub mod tts;

pub use router::create_router;

use axum::http::HeaderMap;

const USER_ID_HEADER: &str = "x-user-id";
const DEFAULT_USER_ID: i64 = 1;

/// Caller identity, asserted via header and not verified. Absent or
/// malformed values fall back to the single-tenant default.
pub fn current_user_id(headers: &HeaderMap) -> i64 {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(DEFAULT_USER_ID)
}
