use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::current_user_id;
use crate::error::ApiError;
use crate::state::AppState;
use crate::system_prompt_store::{NewSystemPrompt, SystemPrompt, SystemPromptUpdate};

#[derive(Debug, Deserialize)]
pub struct CreatePromptRequest {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePromptRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PromptListResponse {
    pub success: bool,
    pub prompts: Vec<SystemPrompt>,
}

#[derive(Debug, Serialize)]
pub struct PromptResponse {
    pub success: bool,
    pub prompt: SystemPrompt,
}

#[derive(Debug, Serialize)]
pub struct ActivePromptResponse {
    pub success: bool,
    pub prompt: Option<SystemPrompt>,
}

#[derive(Debug, Serialize)]
pub struct PromptActionResponse {
    pub success: bool,
    pub prompt_id: i64,
}

pub async fn list_prompts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PromptListResponse>, ApiError> {
    let user_id = current_user_id(&headers);
    let prompts = state.system_prompt_store.get_all_prompts(user_id).await?;

    Ok(Json(PromptListResponse {
        success: true,
        prompts,
    }))
}

/// The prompt that would drive the next chat turn, if any.
pub async fn get_active_prompt(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ActivePromptResponse>, ApiError> {
    let user_id = current_user_id(&headers);
    let prompt = state.system_prompt_store.get_active_prompt(user_id).await?;

    Ok(Json(ActivePromptResponse {
        success: true,
        prompt,
    }))
}

pub async fn create_prompt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreatePromptRequest>,
) -> Result<Json<PromptResponse>, ApiError> {
    let user_id = current_user_id(&headers);
    let prompt = state
        .system_prompt_store
        .create_prompt(
            user_id,
            NewSystemPrompt {
                name: request.name,
                content: request.content,
                category: request.category,
                tags: request.tags,
            },
        )
        .await?;

    info!(prompt_id = prompt.id, "System prompt created");
    Ok(Json(PromptResponse {
        success: true,
        prompt,
    }))
}

pub async fn update_prompt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(prompt_id): Path<i64>,
    Json(request): Json<UpdatePromptRequest>,
) -> Result<Json<PromptResponse>, ApiError> {
    let user_id = current_user_id(&headers);
    let prompt = state
        .system_prompt_store
        .update_prompt(
            prompt_id,
            user_id,
            SystemPromptUpdate {
                name: request.name,
                content: request.content,
                category: request.category,
                tags: request.tags,
            },
        )
        .await?
        .ok_or_else(|| ApiError::not_found("提示词不存在或无权限访问"))?;

    Ok(Json(PromptResponse {
        success: true,
        prompt,
    }))
}

pub async fn delete_prompt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(prompt_id): Path<i64>,
) -> Result<Json<PromptActionResponse>, ApiError> {
    let user_id = current_user_id(&headers);
    let deleted = state
        .system_prompt_store
        .delete_prompt(prompt_id, user_id)
        .await?;
    if !deleted {
        return Err(ApiError::not_found("提示词不存在或无权限访问"));
    }

    Ok(Json(PromptActionResponse {
        success: true,
        prompt_id,
    }))
}

pub async fn activate_prompt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(prompt_id): Path<i64>,
) -> Result<Json<PromptActionResponse>, ApiError> {
    let user_id = current_user_id(&headers);
    let activated = state
        .system_prompt_store
        .set_active_prompt(prompt_id, user_id)
        .await?;
    if !activated {
        return Err(ApiError::not_found("提示词不存在或无权限访问"));
    }

    info!(prompt_id, "System prompt activated");
    Ok(Json(PromptActionResponse {
        success: true,
        prompt_id,
    }))
}
