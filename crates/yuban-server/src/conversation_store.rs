//! Persistent conversation/message storage backed by SQLite.
//!
//! Every operation is scoped to an owning user: a conversation id that does
//! not resolve under `(id, user_id)` behaves as absent, which is how per-user
//! isolation is realized without a separate authorization layer. All rows are
//! returned as plain detached structs, safe to read long after the underlying
//! connection is gone.

use crate::error::{StoreError, StoreResult};
use crate::storage_layout::{ensure_parent_dir, open_connection, resolve_db_path};
use anyhow::{anyhow, Context};
use chrono::{Local, NaiveTime, TimeZone};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task;

pub const DEFAULT_CONVERSATION_TITLE: &str = "新对话";
const TITLE_MAX_CHARS: usize = 20;
const EXPORT_MESSAGE_LIMIT: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: i64,
    pub user_id: i64,
    pub title: Option<String>,
    pub system_prompt: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub role: String,
    pub content: String,
    pub content_type: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: i64,
}

/// A message joined with its conversation title, for the cross-conversation
/// history view.
#[derive(Debug, Clone, Serialize)]
pub struct RecentMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub conversation_title: Option<String>,
    pub role: String,
    pub content: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationOrderBy {
    #[default]
    UpdatedAt,
    CreatedAt,
}

impl ConversationOrderBy {
    const fn column(self) -> &'static str {
        match self {
            Self::UpdatedAt => "updated_at",
            Self::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ListOptions {
    pub limit: usize,
    pub offset: usize,
    pub order_by: ConversationOrderBy,
    pub order: SortOrder,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
            order_by: ConversationOrderBy::default(),
            order: SortOrder::default(),
        }
    }
}

/// Whitelisted partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ConversationUpdate {
    pub title: Option<String>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationStats {
    pub total_conversations: i64,
    pub total_messages: i64,
    pub today_conversations: i64,
    pub today_messages: i64,
    pub avg_message_length: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Txt,
}

impl ExportFormat {
    pub fn parse(raw: &str) -> StoreResult<Self> {
        match raw {
            "json" => Ok(Self::Json),
            "txt" => Ok(Self::Txt),
            other => Err(StoreError::Validation(format!("不支持的导出格式: {other}"))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportedConversation {
    id: i64,
    title: Option<String>,
    system_prompt: Option<String>,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportedMessage {
    role: String,
    content: String,
    created_at: String,
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConversationExport {
    conversation: ExportedConversation,
    messages: Vec<ExportedMessage>,
}

#[derive(Clone)]
pub struct ConversationStore {
    db_path: PathBuf,
}

impl ConversationStore {
    pub fn initialize() -> anyhow::Result<Self> {
        Self::initialize_at(resolve_db_path())
    }

    pub fn initialize_at(db_path: PathBuf) -> anyhow::Result<Self> {
        ensure_parent_dir(&db_path)?;

        let conn = open_connection(&db_path)
            .with_context(|| format!("Failed to open conversation database: {}", db_path.display()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                title TEXT NULL,
                system_prompt TEXT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY,
                conversation_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                content_type TEXT NOT NULL DEFAULT 'text',
                metadata TEXT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_user_updated_at
                ON conversations(user_id, updated_at DESC, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_messages_conversation_created_at
                ON messages(conversation_id, created_at, id);
            "#,
        )
        .context("Failed to initialize conversation database schema")?;

        Ok(Self { db_path })
    }

    pub async fn create_conversation(
        &self,
        user_id: i64,
        system_prompt: Option<String>,
    ) -> StoreResult<Conversation> {
        self.run_blocking(move |db_path| {
            let conn = open_connection(&db_path)?;
            let now = now_unix_millis();
            conn.execute(
                r#"
                INSERT INTO conversations (user_id, title, system_prompt, created_at, updated_at)
                VALUES (?1, NULL, ?2, ?3, ?3)
                "#,
                params![user_id, system_prompt, now],
            )?;

            Ok(Conversation {
                id: conn.last_insert_rowid(),
                user_id,
                title: None,
                system_prompt,
                created_at: now,
                updated_at: now,
            })
        })
        .await
    }

    pub async fn get_conversation(
        &self,
        conversation_id: i64,
        user_id: i64,
    ) -> StoreResult<Option<Conversation>> {
        self.run_blocking(move |db_path| {
            let conn = open_connection(&db_path)?;
            let conversation = conn
                .query_row(
                    r#"
                    SELECT id, user_id, title, system_prompt, created_at, updated_at
                    FROM conversations
                    WHERE id = ?1 AND user_id = ?2
                    "#,
                    params![conversation_id, user_id],
                    map_conversation,
                )
                .optional()?;
            Ok(conversation)
        })
        .await
    }

    pub async fn list_conversations(
        &self,
        user_id: i64,
        options: ListOptions,
    ) -> StoreResult<Vec<Conversation>> {
        self.run_blocking(move |db_path| {
            let conn = open_connection(&db_path)?;
            // Order column/direction come from closed enums, never from the
            // request string, so interpolation here is safe.
            let sql = format!(
                r#"
                SELECT id, user_id, title, system_prompt, created_at, updated_at
                FROM conversations
                WHERE user_id = ?1
                ORDER BY {column} {order}, id {order}
                LIMIT ?2 OFFSET ?3
                "#,
                column = options.order_by.column(),
                order = options.order.keyword(),
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![user_id, options.limit as i64, options.offset as i64],
                map_conversation,
            )?;

            let mut conversations = Vec::new();
            for row in rows {
                conversations.push(row?);
            }
            Ok(conversations)
        })
        .await
    }

    /// Partial update of whitelisted fields; always stamps `updated_at`.
    /// Returns `None` when the conversation does not resolve for this user.
    pub async fn update_conversation(
        &self,
        conversation_id: i64,
        user_id: i64,
        update: ConversationUpdate,
    ) -> StoreResult<Option<Conversation>> {
        self.run_blocking(move |db_path| {
            let conn = open_connection(&db_path)?;
            let now = now_unix_millis();
            let changed = conn.execute(
                r#"
                UPDATE conversations
                SET title = COALESCE(?1, title),
                    system_prompt = COALESCE(?2, system_prompt),
                    updated_at = ?3
                WHERE id = ?4 AND user_id = ?5
                "#,
                params![update.title, update.system_prompt, now, conversation_id, user_id],
            )?;

            if changed == 0 {
                return Ok(None);
            }

            let conversation = conn.query_row(
                r#"
                SELECT id, user_id, title, system_prompt, created_at, updated_at
                FROM conversations
                WHERE id = ?1 AND user_id = ?2
                "#,
                params![conversation_id, user_id],
                map_conversation,
            )?;
            Ok(Some(conversation))
        })
        .await
    }

    /// Deletes owned messages then the conversation. Returns `false` when
    /// the conversation does not resolve, so a double delete is safe.
    pub async fn delete_conversation(
        &self,
        conversation_id: i64,
        user_id: i64,
    ) -> StoreResult<bool> {
        self.run_blocking(move |db_path| {
            let mut conn = open_connection(&db_path)?;
            let tx = conn.transaction()?;

            tx.execute(
                r#"
                DELETE FROM messages
                WHERE conversation_id IN (
                    SELECT id FROM conversations WHERE id = ?1 AND user_id = ?2
                )
                "#,
                params![conversation_id, user_id],
            )?;
            let deleted = tx.execute(
                "DELETE FROM conversations WHERE id = ?1 AND user_id = ?2",
                params![conversation_id, user_id],
            )?;

            tx.commit()?;
            Ok(deleted > 0)
        })
        .await
    }

    /// Inserts a message and bumps the conversation's `updated_at` in one
    /// transaction. Fails with [`StoreError::NotFound`] when the
    /// conversation does not resolve for this user.
    pub async fn add_message(
        &self,
        conversation_id: i64,
        user_id: i64,
        content: String,
        role: String,
        metadata: Option<serde_json::Value>,
    ) -> StoreResult<Message> {
        self.run_blocking(move |db_path| {
            let mut conn = open_connection(&db_path)?;
            let tx = conn.transaction()?;

            let owned = tx
                .query_row(
                    "SELECT 1 FROM conversations WHERE id = ?1 AND user_id = ?2 LIMIT 1",
                    params![conversation_id, user_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !owned {
                return Err(StoreError::NotFound);
            }

            let now = now_unix_millis();
            let metadata_json = metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|err| StoreError::Storage(anyhow!("Invalid message metadata: {err}")))?;

            tx.execute(
                r#"
                INSERT INTO messages (conversation_id, role, content, content_type, metadata, created_at)
                VALUES (?1, ?2, ?3, 'text', ?4, ?5)
                "#,
                params![conversation_id, role, content, metadata_json, now],
            )?;
            let message_id = tx.last_insert_rowid();

            tx.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![now, conversation_id],
            )?;

            tx.commit()?;

            Ok(Message {
                id: message_id,
                conversation_id,
                role,
                content,
                content_type: "text".to_string(),
                metadata,
                created_at: now,
            })
        })
        .await
    }

    /// Canonical transcript order: ascending by creation time, insertion
    /// order for ties. Returns an empty list when the conversation does
    /// not resolve for this user.
    pub async fn get_messages(
        &self,
        conversation_id: i64,
        user_id: i64,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<Message>> {
        self.run_blocking(move |db_path| {
            let conn = open_connection(&db_path)?;
            let owned = conn
                .query_row(
                    "SELECT 1 FROM conversations WHERE id = ?1 AND user_id = ?2 LIMIT 1",
                    params![conversation_id, user_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !owned {
                return Ok(Vec::new());
            }

            let mut stmt = conn.prepare(
                r#"
                SELECT id, conversation_id, role, content, content_type, metadata, created_at
                FROM messages
                WHERE conversation_id = ?1
                ORDER BY created_at ASC, id ASC
                LIMIT ?2 OFFSET ?3
                "#,
            )?;
            let rows = stmt.query_map(
                params![conversation_id, limit as i64, offset as i64],
                map_message,
            )?;

            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
    }

    /// Most recent messages across all of the user's conversations,
    /// newest first, each carrying its conversation's title.
    pub async fn get_recent_messages(
        &self,
        user_id: i64,
        limit: usize,
    ) -> StoreResult<Vec<RecentMessage>> {
        self.run_blocking(move |db_path| {
            let conn = open_connection(&db_path)?;
            let mut stmt = conn.prepare(
                r#"
                SELECT m.id, m.conversation_id, c.title, m.role, m.content, m.created_at
                FROM messages m
                JOIN conversations c ON c.id = m.conversation_id
                WHERE c.user_id = ?1
                ORDER BY m.created_at DESC, m.id DESC
                LIMIT ?2
                "#,
            )?;
            let rows = stmt.query_map(params![user_id, limit as i64], |row| {
                Ok(RecentMessage {
                    id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    conversation_title: row.get(2)?,
                    role: row.get(3)?,
                    content: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?;

            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
    }

    pub async fn count_messages(&self, conversation_id: i64, user_id: i64) -> StoreResult<i64> {
        self.run_blocking(move |db_path| {
            let conn = open_connection(&db_path)?;
            let count = conn.query_row(
                r#"
                SELECT COUNT(1)
                FROM messages m
                JOIN conversations c ON c.id = m.conversation_id
                WHERE m.conversation_id = ?1 AND c.user_id = ?2
                "#,
                params![conversation_id, user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
    }

    /// Aggregate read, no side effects.
    pub async fn get_conversation_stats(&self, user_id: i64) -> StoreResult<ConversationStats> {
        self.run_blocking(move |db_path| {
            let conn = open_connection(&db_path)?;
            let today_start = today_start_millis();

            let total_conversations: i64 = conn.query_row(
                "SELECT COUNT(1) FROM conversations WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )?;
            let total_messages: i64 = conn.query_row(
                r#"
                SELECT COUNT(1) FROM messages m
                JOIN conversations c ON c.id = m.conversation_id
                WHERE c.user_id = ?1
                "#,
                params![user_id],
                |row| row.get(0),
            )?;
            let today_conversations: i64 = conn.query_row(
                "SELECT COUNT(1) FROM conversations WHERE user_id = ?1 AND created_at >= ?2",
                params![user_id, today_start],
                |row| row.get(0),
            )?;
            let today_messages: i64 = conn.query_row(
                r#"
                SELECT COUNT(1) FROM messages m
                JOIN conversations c ON c.id = m.conversation_id
                WHERE c.user_id = ?1 AND m.created_at >= ?2
                "#,
                params![user_id, today_start],
                |row| row.get(0),
            )?;
            let avg_message_length: Option<f64> = conn.query_row(
                r#"
                SELECT AVG(LENGTH(m.content)) FROM messages m
                JOIN conversations c ON c.id = m.conversation_id
                WHERE c.user_id = ?1
                "#,
                params![user_id],
                |row| row.get(0),
            )?;

            Ok(ConversationStats {
                total_conversations,
                total_messages,
                today_conversations,
                today_messages,
                avg_message_length: round2(avg_message_length.unwrap_or(0.0)),
            })
        })
        .await
    }

    /// Serializes the conversation into a portable document. Fails with
    /// [`StoreError::NotFound`] when the conversation does not resolve.
    pub async fn export_conversation(
        &self,
        conversation_id: i64,
        user_id: i64,
        format: ExportFormat,
    ) -> StoreResult<String> {
        let conversation = self
            .get_conversation(conversation_id, user_id)
            .await?
            .ok_or(StoreError::NotFound)?;
        let messages = self
            .get_messages(conversation_id, user_id, EXPORT_MESSAGE_LIMIT, 0)
            .await?;

        match format {
            ExportFormat::Json => {
                let export = ConversationExport {
                    conversation: ExportedConversation {
                        id: conversation.id,
                        title: conversation.title,
                        system_prompt: conversation.system_prompt,
                        created_at: format_rfc3339(conversation.created_at),
                        updated_at: format_rfc3339(conversation.updated_at),
                    },
                    messages: messages
                        .into_iter()
                        .map(|message| ExportedMessage {
                            role: message.role,
                            content: message.content,
                            created_at: format_rfc3339(message.created_at),
                            metadata: message.metadata,
                        })
                        .collect(),
                };
                serde_json::to_string_pretty(&export)
                    .map_err(|err| StoreError::Storage(anyhow!("Export serialization failed: {err}")))
            }
            ExportFormat::Txt => {
                let title = conversation
                    .title
                    .unwrap_or_else(|| format!("对话 {}", conversation.id));
                let mut lines = vec![
                    format!("对话: {title}"),
                    format!("创建时间: {}", format_rfc3339(conversation.created_at)),
                    format!("更新时间: {}", format_rfc3339(conversation.updated_at)),
                ];
                if let Some(system_prompt) = conversation.system_prompt {
                    lines.push(format!("系统提示: {system_prompt}"));
                }
                lines.push(String::new());
                lines.push("消息记录:".to_string());
                lines.push("=".repeat(50));

                for message in messages {
                    lines.push(format!(
                        "[{}] {}:",
                        format_transcript_time(message.created_at),
                        message.role
                    ));
                    lines.push(message.content);
                    lines.push(String::new());
                }

                Ok(lines.join("\n"))
            }
        }
    }

    async fn run_blocking<F, T>(&self, task_fn: F) -> StoreResult<T>
    where
        F: FnOnce(PathBuf) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db_path = self.db_path.clone();
        task::spawn_blocking(move || task_fn(db_path))
            .await
            .map_err(|err| StoreError::Storage(anyhow!("Conversation storage worker failed: {err}")))?
    }
}

/// Derive a conversation title from its first message: the first 20
/// characters, with an ellipsis when truncated.
pub fn derive_conversation_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    if trimmed.is_empty() {
        return DEFAULT_CONVERSATION_TITLE.to_string();
    }

    let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        system_prompt: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let metadata_raw: Option<String> = row.get(5)?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        content_type: row.get(4)?,
        metadata: metadata_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
        created_at: row.get(6)?,
    })
}

fn now_unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn today_start_millis() -> i64 {
    let midnight = Local::now().date_naive().and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&midnight) {
        chrono::LocalResult::Single(dt) => dt.timestamp_millis(),
        chrono::LocalResult::Ambiguous(earliest, _) => earliest.timestamp_millis(),
        chrono::LocalResult::None => Local::now().timestamp_millis(),
    }
}

pub(crate) fn format_rfc3339(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis) {
        chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => dt.to_rfc3339(),
        chrono::LocalResult::None => millis.to_string(),
    }
}

fn format_transcript_time(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis) {
        chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
            dt.format("%Y-%m-%d %H:%M:%S").to_string()
        }
        chrono::LocalResult::None => millis.to_string(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn store() -> (ConversationStore, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let store = ConversationStore::initialize_at(dir.path().join("test.sqlite3"))
            .expect("store should initialize");
        (store, dir)
    }

    #[tokio::test]
    async fn created_conversation_is_readable_by_owner_only() {
        let (store, _dir) = store();
        let conversation = store
            .create_conversation(1, Some("temp prompt".to_string()))
            .await
            .expect("create");

        let fetched = store
            .get_conversation(conversation.id, 1)
            .await
            .expect("get")
            .expect("present for owner");
        assert_eq!(fetched.system_prompt.as_deref(), Some("temp prompt"));
        assert_eq!(fetched.created_at, fetched.updated_at);

        let foreign = store
            .get_conversation(conversation.id, 2)
            .await
            .expect("get");
        assert!(foreign.is_none());
    }

    #[tokio::test]
    async fn add_message_requires_ownership() {
        let (store, _dir) = store();
        let conversation = store.create_conversation(1, None).await.expect("create");

        let err = store
            .add_message(conversation.id, 2, "hi".to_string(), "user".to_string(), None)
            .await
            .expect_err("foreign user must not append");
        assert!(matches!(err, StoreError::NotFound));

        let missing = store
            .add_message(9999, 1, "hi".to_string(), "user".to_string(), None)
            .await
            .expect_err("absent conversation must not accept messages");
        assert!(matches!(missing, StoreError::NotFound));
    }

    #[tokio::test]
    async fn recent_messages_span_conversations_newest_first_and_stay_scoped() {
        let (store, _dir) = store();
        let chat_a = store.create_conversation(1, None).await.expect("create a");
        store
            .update_conversation(
                chat_a.id,
                1,
                ConversationUpdate {
                    title: Some("点餐".to_string()),
                    system_prompt: None,
                },
            )
            .await
            .expect("title a");
        let chat_b = store.create_conversation(1, None).await.expect("create b");
        let foreign = store.create_conversation(2, None).await.expect("create foreign");

        store
            .add_message(chat_a.id, 1, "第一条".to_string(), "user".to_string(), None)
            .await
            .expect("a1");
        tokio::time::sleep(Duration::from_millis(5)).await;
        store
            .add_message(chat_b.id, 1, "第二条".to_string(), "user".to_string(), None)
            .await
            .expect("b1");
        tokio::time::sleep(Duration::from_millis(5)).await;
        store
            .add_message(chat_a.id, 1, "第三条".to_string(), "assistant".to_string(), None)
            .await
            .expect("a2");
        store
            .add_message(foreign.id, 2, "别人的".to_string(), "user".to_string(), None)
            .await
            .expect("foreign message");

        let recent = store.get_recent_messages(1, 10).await.expect("recent");
        assert_eq!(recent.len(), 3);
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["第三条", "第二条", "第一条"]);
        assert_eq!(recent[0].conversation_id, chat_a.id);
        assert_eq!(recent[0].conversation_title.as_deref(), Some("点餐"));
        assert_eq!(recent[1].conversation_id, chat_b.id);
        assert!(recent[1].conversation_title.is_none());

        let capped = store.get_recent_messages(1, 2).await.expect("capped");
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].content, "第三条");
    }

    #[tokio::test]
    async fn add_message_bumps_updated_at_and_preserves_order() {
        let (store, _dir) = store();
        let conversation = store.create_conversation(1, None).await.expect("create");

        tokio::time::sleep(Duration::from_millis(10)).await;
        let first = store
            .add_message(conversation.id, 1, "第一条".to_string(), "user".to_string(), None)
            .await
            .expect("first message");
        let second = store
            .add_message(
                conversation.id,
                1,
                "第二条".to_string(),
                "assistant".to_string(),
                Some(serde_json::json!({ "model": "qwen2.5:1.5b" })),
            )
            .await
            .expect("second message");

        let refreshed = store
            .get_conversation(conversation.id, 1)
            .await
            .expect("get")
            .expect("present");
        assert!(refreshed.updated_at >= first.created_at);
        assert!(refreshed.updated_at > conversation.updated_at);

        let messages = store
            .get_messages(conversation.id, 1, 50, 0)
            .await
            .expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, first.id);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].id, second.id);
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(
            messages[1].metadata,
            Some(serde_json::json!({ "model": "qwen2.5:1.5b" }))
        );
    }

    #[tokio::test]
    async fn messages_with_equal_timestamps_keep_insertion_order() {
        let (store, _dir) = store();
        let conversation = store.create_conversation(1, None).await.expect("create");

        // Appends within the same millisecond are ordered by rowid.
        for n in 0..5 {
            store
                .add_message(conversation.id, 1, format!("m{n}"), "user".to_string(), None)
                .await
                .expect("append");
        }

        let messages = store
            .get_messages(conversation.id, 1, 50, 0)
            .await
            .expect("messages");
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn foreign_or_absent_conversation_yields_empty_transcript() {
        let (store, _dir) = store();
        let conversation = store.create_conversation(1, None).await.expect("create");
        store
            .add_message(conversation.id, 1, "hi".to_string(), "user".to_string(), None)
            .await
            .expect("append");

        assert!(store
            .get_messages(conversation.id, 2, 50, 0)
            .await
            .expect("foreign read")
            .is_empty());
        assert!(store
            .get_messages(9999, 1, 50, 0)
            .await
            .expect("absent read")
            .is_empty());
    }

    #[tokio::test]
    async fn delete_cascades_and_second_delete_returns_false() {
        let (store, _dir) = store();
        let conversation = store.create_conversation(1, None).await.expect("create");
        store
            .add_message(conversation.id, 1, "hi".to_string(), "user".to_string(), None)
            .await
            .expect("append");

        assert!(store
            .delete_conversation(conversation.id, 1)
            .await
            .expect("first delete"));
        assert!(store
            .get_messages(conversation.id, 1, 50, 0)
            .await
            .expect("read after delete")
            .is_empty());
        assert!(!store
            .delete_conversation(conversation.id, 1)
            .await
            .expect("second delete"));
    }

    #[tokio::test]
    async fn delete_is_scoped_to_owner() {
        let (store, _dir) = store();
        let conversation = store.create_conversation(1, None).await.expect("create");

        assert!(!store
            .delete_conversation(conversation.id, 2)
            .await
            .expect("foreign delete"));
        assert!(store
            .get_conversation(conversation.id, 1)
            .await
            .expect("get")
            .is_some());
    }

    #[tokio::test]
    async fn list_defaults_to_most_recently_updated_first() {
        let (store, _dir) = store();
        let older = store.create_conversation(1, None).await.expect("create");
        tokio::time::sleep(Duration::from_millis(10)).await;
        let newer = store.create_conversation(1, None).await.expect("create");
        tokio::time::sleep(Duration::from_millis(10)).await;
        // Touch the older conversation so it becomes the most recent.
        store
            .add_message(older.id, 1, "hi".to_string(), "user".to_string(), None)
            .await
            .expect("append");

        let listed = store
            .list_conversations(1, ListOptions::default())
            .await
            .expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, older.id);
        assert_eq!(listed[1].id, newer.id);

        let by_created = store
            .list_conversations(
                1,
                ListOptions {
                    order_by: ConversationOrderBy::CreatedAt,
                    order: SortOrder::Asc,
                    ..Default::default()
                },
            )
            .await
            .expect("list by created");
        assert_eq!(by_created[0].id, older.id);
        assert_eq!(by_created[1].id, newer.id);
    }

    #[tokio::test]
    async fn list_pagination_applies_limit_and_offset() {
        let (store, _dir) = store();
        for _ in 0..5 {
            store.create_conversation(1, None).await.expect("create");
        }

        let page = store
            .list_conversations(
                1,
                ListOptions {
                    limit: 2,
                    offset: 2,
                    order_by: ConversationOrderBy::CreatedAt,
                    order: SortOrder::Asc,
                },
            )
            .await
            .expect("list");
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn update_stamps_updated_at_and_respects_ownership() {
        let (store, _dir) = store();
        let conversation = store.create_conversation(1, None).await.expect("create");

        tokio::time::sleep(Duration::from_millis(10)).await;
        let updated = store
            .update_conversation(
                conversation.id,
                1,
                ConversationUpdate {
                    title: Some("标题".to_string()),
                    system_prompt: None,
                },
            )
            .await
            .expect("update")
            .expect("resolves for owner");
        assert_eq!(updated.title.as_deref(), Some("标题"));
        assert!(updated.updated_at > conversation.updated_at);

        let foreign = store
            .update_conversation(
                conversation.id,
                2,
                ConversationUpdate {
                    title: Some("x".to_string()),
                    system_prompt: None,
                },
            )
            .await
            .expect("update");
        assert!(foreign.is_none());
    }

    #[tokio::test]
    async fn stats_count_per_user() {
        let (store, _dir) = store();
        let mine = store.create_conversation(1, None).await.expect("create");
        store.create_conversation(2, None).await.expect("create other user");
        store
            .add_message(mine.id, 1, "四个字啊".to_string(), "user".to_string(), None)
            .await
            .expect("append");

        let stats = store.get_conversation_stats(1).await.expect("stats");
        assert_eq!(stats.total_conversations, 1);
        assert_eq!(stats.total_messages, 1);
        assert_eq!(stats.today_conversations, 1);
        assert_eq!(stats.today_messages, 1);
        assert!(stats.avg_message_length > 0.0);
    }

    #[tokio::test]
    async fn json_export_round_trips_the_transcript() {
        let (store, _dir) = store();
        let conversation = store.create_conversation(1, None).await.expect("create");
        store
            .add_message(conversation.id, 1, "你好".to_string(), "user".to_string(), None)
            .await
            .expect("append");
        store
            .add_message(
                conversation.id,
                1,
                "你好！有什么可以帮你的？".to_string(),
                "assistant".to_string(),
                None,
            )
            .await
            .expect("append");

        let raw = store
            .export_conversation(conversation.id, 1, ExportFormat::Json)
            .await
            .expect("export");
        let export: ConversationExport = serde_json::from_str(&raw).expect("valid JSON");
        assert_eq!(export.conversation.id, conversation.id);

        let messages = store
            .get_messages(conversation.id, 1, 50, 0)
            .await
            .expect("messages");
        assert_eq!(export.messages.len(), messages.len());
        for (exported, stored) in export.messages.iter().zip(&messages) {
            assert_eq!(exported.role, stored.role);
            assert_eq!(exported.content, stored.content);
        }
    }

    #[tokio::test]
    async fn txt_export_is_a_readable_transcript() {
        let (store, _dir) = store();
        let conversation = store.create_conversation(1, None).await.expect("create");
        store
            .update_conversation(
                conversation.id,
                1,
                ConversationUpdate {
                    title: Some("测试对话".to_string()),
                    system_prompt: None,
                },
            )
            .await
            .expect("title");
        store
            .add_message(conversation.id, 1, "你好".to_string(), "user".to_string(), None)
            .await
            .expect("append");

        let text = store
            .export_conversation(conversation.id, 1, ExportFormat::Txt)
            .await
            .expect("export");
        assert!(text.contains("对话: 测试对话"));
        assert!(text.contains("消息记录:"));
        assert!(text.contains("user:"));
        assert!(text.contains("你好"));
    }

    #[tokio::test]
    async fn export_rejects_unsupported_formats_and_foreign_reads() {
        let (store, _dir) = store();
        let conversation = store.create_conversation(1, None).await.expect("create");

        assert!(matches!(
            ExportFormat::parse("xml"),
            Err(StoreError::Validation(_))
        ));
        let err = store
            .export_conversation(conversation.id, 2, ExportFormat::Json)
            .await
            .expect_err("foreign export");
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn title_derivation_matches_the_contract() {
        assert_eq!(derive_conversation_title("Hello"), "Hello");
        assert_eq!(
            derive_conversation_title("1234567890123456789012345"),
            "12345678901234567890..."
        );
        assert_eq!(derive_conversation_title("   "), DEFAULT_CONVERSATION_TITLE);
        assert_eq!(derive_conversation_title(""), DEFAULT_CONVERSATION_TITLE);
        // Truncation counts characters, not bytes.
        assert_eq!(
            derive_conversation_title("今天天气真好今天天气真好今天天气真好今天天气"),
            "今天天气真好今天天气真好今天天气真好今天..."
        );
    }
}
