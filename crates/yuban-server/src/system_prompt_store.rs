//! Named, reusable system prompts with a single-active selection.
//!
//! At most one prompt per user carries the active mark; activation
//! clears the previous mark in the same transaction so readers never
//! observe two active prompts.

use crate::error::{StoreError, StoreResult};
use crate::storage_layout::{ensure_parent_dir, open_connection, resolve_db_path};
use anyhow::{anyhow, Context};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task;

#[derive(Debug, Clone, Serialize)]
pub struct SystemPrompt {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub content: String,
    pub is_active: bool,
    pub is_default: bool,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NewSystemPrompt {
    pub name: String,
    pub content: String,
    pub category: Option<String>,
    pub tags: Option<String>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct SystemPromptUpdate {
    pub name: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
}

#[derive(Clone)]
pub struct SystemPromptStore {
    db_path: PathBuf,
}

impl SystemPromptStore {
    pub fn initialize() -> anyhow::Result<Self> {
        Self::initialize_at(resolve_db_path())
    }

    pub fn initialize_at(db_path: PathBuf) -> anyhow::Result<Self> {
        ensure_parent_dir(&db_path)?;

        let conn = open_connection(&db_path)
            .with_context(|| format!("Failed to open prompt database: {}", db_path.display()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS system_prompts (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                content TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 0,
                is_default INTEGER NOT NULL DEFAULT 0,
                category TEXT NULL,
                tags TEXT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_system_prompts_user
                ON system_prompts(user_id, created_at DESC);
            "#,
        )
        .context("Failed to initialize prompt database schema")?;

        Ok(Self { db_path })
    }

    pub async fn create_prompt(
        &self,
        user_id: i64,
        prompt: NewSystemPrompt,
    ) -> StoreResult<SystemPrompt> {
        if prompt.name.trim().is_empty() {
            return Err(StoreError::Validation("提示词名称不能为空".to_string()));
        }
        if prompt.content.trim().is_empty() {
            return Err(StoreError::Validation("提示词内容不能为空".to_string()));
        }

        self.run_blocking(move |db_path| {
            let conn = open_connection(&db_path)?;
            let now = now_unix_millis();
            conn.execute(
                r#"
                INSERT INTO system_prompts
                    (user_id, name, content, is_active, is_default, category, tags, created_at, updated_at)
                VALUES (?1, ?2, ?3, 0, 0, ?4, ?5, ?6, ?6)
                "#,
                params![user_id, prompt.name, prompt.content, prompt.category, prompt.tags, now],
            )?;

            Ok(SystemPrompt {
                id: conn.last_insert_rowid(),
                user_id,
                name: prompt.name,
                content: prompt.content,
                is_active: false,
                is_default: false,
                category: prompt.category,
                tags: prompt.tags,
                created_at: now,
                updated_at: now,
            })
        })
        .await
    }

    pub async fn update_prompt(
        &self,
        prompt_id: i64,
        user_id: i64,
        update: SystemPromptUpdate,
    ) -> StoreResult<Option<SystemPrompt>> {
        self.run_blocking(move |db_path| {
            let conn = open_connection(&db_path)?;
            let now = now_unix_millis();
            let changed = conn.execute(
                r#"
                UPDATE system_prompts
                SET name = COALESCE(?1, name),
                    content = COALESCE(?2, content),
                    category = COALESCE(?3, category),
                    tags = COALESCE(?4, tags),
                    updated_at = ?5
                WHERE id = ?6 AND user_id = ?7
                "#,
                params![
                    update.name,
                    update.content,
                    update.category,
                    update.tags,
                    now,
                    prompt_id,
                    user_id
                ],
            )?;

            if changed == 0 {
                return Ok(None);
            }

            let prompt = conn.query_row(
                r#"
                SELECT id, user_id, name, content, is_active, is_default, category, tags,
                       created_at, updated_at
                FROM system_prompts
                WHERE id = ?1 AND user_id = ?2
                "#,
                params![prompt_id, user_id],
                map_prompt,
            )?;
            Ok(Some(prompt))
        })
        .await
    }

    pub async fn delete_prompt(&self, prompt_id: i64, user_id: i64) -> StoreResult<bool> {
        self.run_blocking(move |db_path| {
            let conn = open_connection(&db_path)?;
            let deleted = conn.execute(
                "DELETE FROM system_prompts WHERE id = ?1 AND user_id = ?2",
                params![prompt_id, user_id],
            )?;
            Ok(deleted > 0)
        })
        .await
    }

    /// All prompts owned by the user, newest first.
    pub async fn get_all_prompts(&self, user_id: i64) -> StoreResult<Vec<SystemPrompt>> {
        self.run_blocking(move |db_path| {
            let conn = open_connection(&db_path)?;
            let mut stmt = conn.prepare(
                r#"
                SELECT id, user_id, name, content, is_active, is_default, category, tags,
                       created_at, updated_at
                FROM system_prompts
                WHERE user_id = ?1
                ORDER BY created_at DESC, id DESC
                "#,
            )?;
            let rows = stmt.query_map(params![user_id], map_prompt)?;

            let mut prompts = Vec::new();
            for row in rows {
                prompts.push(row?);
            }
            Ok(prompts)
        })
        .await
    }

    /// The prompt that should drive generation: the active one if any,
    /// otherwise the oldest prompt as a fallback, otherwise `None`.
    pub async fn get_active_prompt(&self, user_id: i64) -> StoreResult<Option<SystemPrompt>> {
        self.run_blocking(move |db_path| {
            let conn = open_connection(&db_path)?;
            let active = conn
                .query_row(
                    r#"
                    SELECT id, user_id, name, content, is_active, is_default, category, tags,
                           created_at, updated_at
                    FROM system_prompts
                    WHERE user_id = ?1 AND is_active = 1
                    ORDER BY updated_at DESC, id DESC
                    LIMIT 1
                    "#,
                    params![user_id],
                    map_prompt,
                )
                .optional()?;
            if active.is_some() {
                return Ok(active);
            }

            let fallback = conn
                .query_row(
                    r#"
                    SELECT id, user_id, name, content, is_active, is_default, category, tags,
                           created_at, updated_at
                    FROM system_prompts
                    WHERE user_id = ?1
                    ORDER BY created_at ASC, id ASC
                    LIMIT 1
                    "#,
                    params![user_id],
                    map_prompt,
                )
                .optional()?;
            Ok(fallback)
        })
        .await
    }

    /// Marks one prompt active, clearing any previous mark in the same
    /// transaction. Returns `false` when the prompt does not resolve for
    /// this user (leaving the previous selection intact).
    pub async fn set_active_prompt(&self, prompt_id: i64, user_id: i64) -> StoreResult<bool> {
        self.run_blocking(move |db_path| {
            let mut conn = open_connection(&db_path)?;
            let tx = conn.transaction()?;

            let owned = tx
                .query_row(
                    "SELECT 1 FROM system_prompts WHERE id = ?1 AND user_id = ?2 LIMIT 1",
                    params![prompt_id, user_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !owned {
                return Ok(false);
            }

            let now = now_unix_millis();
            tx.execute(
                "UPDATE system_prompts SET is_active = 0 WHERE user_id = ?1 AND is_active = 1",
                params![user_id],
            )?;
            tx.execute(
                "UPDATE system_prompts SET is_active = 1, updated_at = ?1 WHERE id = ?2",
                params![now, prompt_id],
            )?;

            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn run_blocking<F, T>(&self, task_fn: F) -> StoreResult<T>
    where
        F: FnOnce(PathBuf) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db_path = self.db_path.clone();
        task::spawn_blocking(move || task_fn(db_path))
            .await
            .map_err(|err| StoreError::Storage(anyhow!("Prompt storage worker failed: {err}")))?
    }
}

fn map_prompt(row: &Row<'_>) -> rusqlite::Result<SystemPrompt> {
    let is_active: i64 = row.get(4)?;
    let is_default: i64 = row.get(5)?;
    Ok(SystemPrompt {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        content: row.get(3)?,
        is_active: is_active != 0,
        is_default: is_default != 0,
        category: row.get(6)?,
        tags: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn now_unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn prompt(name: &str, content: &str) -> NewSystemPrompt {
        NewSystemPrompt {
            name: name.to_string(),
            content: content.to_string(),
            ..Default::default()
        }
    }

    fn store() -> (SystemPromptStore, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let store = SystemPromptStore::initialize_at(dir.path().join("test.sqlite3"))
            .expect("store should initialize");
        (store, dir)
    }

    #[tokio::test]
    async fn create_rejects_blank_name_or_content() {
        let (store, _dir) = store();

        assert!(matches!(
            store.create_prompt(1, prompt("  ", "内容")).await,
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            store.create_prompt(1, prompt("名称", "")).await,
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn prompts_list_newest_first_per_user() {
        let (store, _dir) = store();
        let first = store
            .create_prompt(1, prompt("助手", "你是一个有用的AI助手。"))
            .await
            .expect("create");
        let second = store
            .create_prompt(1, prompt("诗人", "你是一位诗人。"))
            .await
            .expect("create");
        store
            .create_prompt(2, prompt("别人", "其他用户的提示。"))
            .await
            .expect("create other");

        let prompts = store.get_all_prompts(1).await.expect("list");
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0].id, second.id);
        assert_eq!(prompts[1].id, first.id);
    }

    #[tokio::test]
    async fn at_most_one_prompt_is_active() {
        let (store, _dir) = store();
        let first = store
            .create_prompt(1, prompt("a", "内容A"))
            .await
            .expect("create");
        let second = store
            .create_prompt(1, prompt("b", "内容B"))
            .await
            .expect("create");

        assert!(store.set_active_prompt(first.id, 1).await.expect("activate"));
        assert!(store.set_active_prompt(second.id, 1).await.expect("activate"));

        let prompts = store.get_all_prompts(1).await.expect("list");
        let active: Vec<_> = prompts.iter().filter(|p| p.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
    }

    #[tokio::test]
    async fn activation_is_scoped_to_owner() {
        let (store, _dir) = store();
        let first = store
            .create_prompt(1, prompt("a", "内容A"))
            .await
            .expect("create");
        assert!(store.set_active_prompt(first.id, 1).await.expect("activate"));

        assert!(!store.set_active_prompt(first.id, 2).await.expect("foreign"));
        assert!(!store.set_active_prompt(9999, 1).await.expect("absent"));

        // The previous selection is untouched.
        let active = store
            .get_active_prompt(1)
            .await
            .expect("active")
            .expect("present");
        assert_eq!(active.id, first.id);
    }

    #[tokio::test]
    async fn active_prompt_falls_back_to_the_oldest() {
        let (store, _dir) = store();
        assert!(store.get_active_prompt(1).await.expect("empty").is_none());

        let first = store
            .create_prompt(1, prompt("a", "内容A"))
            .await
            .expect("create");
        store
            .create_prompt(1, prompt("b", "内容B"))
            .await
            .expect("create");

        // No explicit activation yet: the oldest prompt drives generation.
        let fallback = store
            .get_active_prompt(1)
            .await
            .expect("active")
            .expect("present");
        assert_eq!(fallback.id, first.id);
    }

    #[tokio::test]
    async fn update_and_delete_respect_ownership() {
        let (store, _dir) = store();
        let prompt = store
            .create_prompt(1, prompt("a", "内容A"))
            .await
            .expect("create");

        let updated = store
            .update_prompt(
                prompt.id,
                1,
                SystemPromptUpdate {
                    content: Some("新内容".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("update")
            .expect("resolves");
        assert_eq!(updated.content, "新内容");
        assert_eq!(updated.name, "a");

        assert!(store
            .update_prompt(prompt.id, 2, SystemPromptUpdate::default())
            .await
            .expect("foreign update")
            .is_none());
        assert!(!store.delete_prompt(prompt.id, 2).await.expect("foreign delete"));
        assert!(store.delete_prompt(prompt.id, 1).await.expect("delete"));
        assert!(!store.delete_prompt(prompt.id, 1).await.expect("second delete"));
    }

    #[tokio::test]
    async fn deleting_the_active_prompt_falls_back() {
        let (store, _dir) = store();
        let first = store
            .create_prompt(1, prompt("a", "内容A"))
            .await
            .expect("create");
        let second = store
            .create_prompt(1, prompt("b", "内容B"))
            .await
            .expect("create");
        assert!(store.set_active_prompt(second.id, 1).await.expect("activate"));
        assert!(store.delete_prompt(second.id, 1).await.expect("delete"));

        let fallback = store
            .get_active_prompt(1)
            .await
            .expect("active")
            .expect("present");
        assert_eq!(fallback.id, first.id);
    }
}
