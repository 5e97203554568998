use axum::{
    extract::{Extension, Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::current_user_id;
use crate::api::request_context::RequestContext;
use crate::conversation_store::{
    derive_conversation_title, format_rfc3339, Conversation, ConversationOrderBy,
    ConversationStats, ConversationUpdate, ExportFormat, ListOptions, SortOrder,
};
use crate::error::{ApiError, StoreError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<i64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatResponse {
    fn failure(error: String) -> Self {
        Self {
            success: false,
            message: None,
            conversation_id: None,
            message_id: None,
            timestamp: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListConversationsQuery {
    #[serde(default = "default_list_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub order_by: ConversationOrderBy,
    #[serde(default)]
    pub order: SortOrder,
}

fn default_list_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: i64,
    pub title: Option<String>,
    pub system_prompt: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub success: bool,
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default = "default_messages_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_messages_limit() -> usize {
    100
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: i64,
    pub role: String,
    pub content: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub success: bool,
    pub conversation_id: i64,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct HistoryItem {
    pub id: i64,
    pub conversation_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_title: Option<String>,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub history: Vec<HistoryItem>,
}

#[derive(Debug, Serialize)]
pub struct DeleteConversationResponse {
    pub success: bool,
    pub conversation_id: i64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: ConversationStats,
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    #[serde(default = "default_export_format")]
    pub format: String,
}

fn default_export_format() -> String {
    "json".to_string()
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub success: bool,
    pub format: String,
    pub filename: String,
    pub content: String,
}

/// Full chat turn: resolve the conversation, persist the user message,
/// generate a reply, persist it, and report both ids. Adapter failures
/// surface as fallback reply text; persistence failures after the
/// conversation resolved surface as a `success:false` body.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let _permit = state.acquire_permit().await;
    let user_id = current_user_id(&headers);

    let message = request.message.trim().to_string();
    if message.is_empty() {
        return Err(ApiError::bad_request("消息内容不能为空"));
    }

    let (conversation, is_new) = match request.conversation_id {
        Some(conversation_id) => {
            let conversation = state
                .conversation_store
                .get_conversation(conversation_id, user_id)
                .await?
                .ok_or_else(|| ApiError::not_found("对话不存在或无权限访问"))?;
            (conversation, false)
        }
        None => {
            let conversation = state
                .conversation_store
                .create_conversation(user_id, request.system_prompt.clone())
                .await?;
            (conversation, true)
        }
    };

    if let Err(err) = state
        .conversation_store
        .add_message(
            conversation.id,
            user_id,
            message.clone(),
            "user".to_string(),
            None,
        )
        .await
    {
        return failure_or_api_error(conversation.id, err);
    }

    if is_new {
        // Title derivation is cosmetic; a failure never blocks the turn.
        let title = derive_conversation_title(&message);
        if let Err(err) = state
            .conversation_store
            .update_conversation(
                conversation.id,
                user_id,
                ConversationUpdate {
                    title: Some(title),
                    system_prompt: None,
                },
            )
            .await
        {
            warn!(conversation_id = conversation.id, "Failed to persist conversation title: {err}");
        }
    }

    let agent = state
        .agent(user_id, request.model.clone())
        .await
        .map_err(|err| ApiError::internal(format!("Failed to prepare chat agent: {err}")))?;
    let reply = agent.chat(&message).await;

    let assistant_message = match state
        .conversation_store
        .add_message(
            conversation.id,
            user_id,
            reply.clone(),
            "assistant".to_string(),
            request
                .model
                .as_ref()
                .map(|model| serde_json::json!({ "model": model })),
        )
        .await
    {
        Ok(message) => message,
        Err(err) => return failure_or_api_error(conversation.id, err),
    };

    info!(
        correlation_id = %context.correlation_id,
        conversation_id = conversation.id,
        message_id = assistant_message.id,
        "Chat turn completed"
    );

    Ok(Json(ChatResponse {
        success: true,
        message: Some(reply),
        conversation_id: Some(conversation.id),
        message_id: Some(assistant_message.id),
        timestamp: Some(format_rfc3339(assistant_message.created_at)),
        error: None,
    }))
}

/// Ownership misses stay hard 404s; storage faults degrade to a
/// `success:false` body with no ids attached.
fn failure_or_api_error(
    conversation_id: i64,
    err: StoreError,
) -> Result<Json<ChatResponse>, ApiError> {
    match err {
        StoreError::NotFound => Err(ApiError::from(StoreError::NotFound)),
        other => {
            warn!(conversation_id, "Chat persistence failed: {other}");
            Ok(Json(ChatResponse::failure(
                "抱歉，处理您的消息时出现错误，请稍后再试。".to_string(),
            )))
        }
    }
}

pub async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListConversationsQuery>,
) -> Result<Json<ConversationListResponse>, ApiError> {
    let user_id = current_user_id(&headers);
    let conversations = state
        .conversation_store
        .list_conversations(
            user_id,
            ListOptions {
                limit: query.limit.min(100),
                offset: query.offset,
                order_by: query.order_by,
                order: query.order,
            },
        )
        .await?;

    let mut summaries = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        let message_count = state
            .conversation_store
            .count_messages(conversation.id, user_id)
            .await?;
        summaries.push(summarize(conversation, message_count));
    }

    Ok(Json(ConversationListResponse {
        success: true,
        conversations: summaries,
    }))
}

fn summarize(conversation: Conversation, message_count: i64) -> ConversationSummary {
    ConversationSummary {
        id: conversation.id,
        title: conversation.title,
        system_prompt: conversation.system_prompt,
        created_at: format_rfc3339(conversation.created_at),
        updated_at: format_rfc3339(conversation.updated_at),
        message_count,
    }
}

/// Flat recent-message feed across all of the user's conversations,
/// newest first.
pub async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let user_id = current_user_id(&headers);
    let recent = state
        .conversation_store
        .get_recent_messages(user_id, query.limit.min(500))
        .await?;

    Ok(Json(HistoryResponse {
        success: true,
        history: recent
            .into_iter()
            .map(|message| HistoryItem {
                id: message.id,
                conversation_id: message.conversation_id,
                conversation_title: message.conversation_title,
                role: message.role,
                content: message.content,
                created_at: format_rfc3339(message.created_at),
            })
            .collect(),
    }))
}

pub async fn get_conversation_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<i64>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessageListResponse>, ApiError> {
    let user_id = current_user_id(&headers);
    let messages = state
        .conversation_store
        .get_messages(conversation_id, user_id, query.limit.min(1000), query.offset)
        .await?;

    Ok(Json(MessageListResponse {
        success: true,
        conversation_id,
        messages: messages
            .into_iter()
            .map(|message| MessageView {
                id: message.id,
                role: message.role,
                content: message.content,
                created_at: format_rfc3339(message.created_at),
                metadata: message.metadata,
            })
            .collect(),
    }))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<i64>,
) -> Result<Json<DeleteConversationResponse>, ApiError> {
    let user_id = current_user_id(&headers);
    let deleted = state
        .conversation_store
        .delete_conversation(conversation_id, user_id)
        .await?;
    if !deleted {
        return Err(ApiError::not_found("对话不存在或无权限访问"));
    }

    Ok(Json(DeleteConversationResponse {
        success: true,
        conversation_id,
    }))
}

pub async fn get_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatsResponse>, ApiError> {
    let user_id = current_user_id(&headers);
    let stats = state
        .conversation_store
        .get_conversation_stats(user_id)
        .await?;

    Ok(Json(StatsResponse {
        success: true,
        stats,
    }))
}

pub async fn export_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<i64>,
    Json(request): Json<ExportRequest>,
) -> Result<Json<ExportResponse>, ApiError> {
    let user_id = current_user_id(&headers);
    let format = ExportFormat::parse(&request.format)?;
    let content = state
        .conversation_store
        .export_conversation(conversation_id, user_id, format)
        .await?;

    let extension = match format {
        ExportFormat::Json => "json",
        ExportFormat::Txt => "txt",
    };
    Ok(Json(ExportResponse {
        success: true,
        format: request.format,
        filename: format!("conversation_{conversation_id}.{extension}"),
        content,
    }))
}
