//! Error taxonomy for the HTTP boundary and the SQLite stores.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Store-level outcome tag. Callers branch on the variant instead of
/// matching error message text.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record absent or not owned by the requesting user.
    #[error("对话不存在或无权限访问")]
    NotFound,
    /// Malformed request shape (e.g. unsupported export format).
    #[error("{0}")]
    Validation(String),
    /// Storage engine failure; rolled back and logged before surfacing.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.into())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::not_found(err.to_string()),
            StoreError::Validation(message) => Self::bad_request(message),
            StoreError::Storage(err) => Self::internal(format!("Storage error: {err}")),
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            success: false,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_client_facing_statuses() {
        let not_found: ApiError = StoreError::NotFound.into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);

        let validation: ApiError = StoreError::Validation("不支持的导出格式: xml".into()).into();
        assert_eq!(validation.status, StatusCode::BAD_REQUEST);
        assert_eq!(validation.message, "不支持的导出格式: xml");

        let storage: ApiError = StoreError::Storage(anyhow::anyhow!("disk full")).into();
        assert_eq!(storage.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
