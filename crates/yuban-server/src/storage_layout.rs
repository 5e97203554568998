//! Storage path resolution and SQLite connection setup shared by the stores.

use anyhow::Context;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME_DIR: &str = "yuban";
const DEFAULT_DB_FILENAME: &str = "yuban.sqlite3";
const DB_ENV: &str = "YUBAN_DB_PATH";

pub fn resolve_db_path() -> PathBuf {
    if let Some(path) = env_path(DB_ENV) {
        return path;
    }

    resolve_data_root().join(DEFAULT_DB_FILENAME)
}

pub fn ensure_parent_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!(
                "Failed to create SQLite parent directory: {}",
                parent.display()
            )
        })?;
    }
    Ok(())
}

pub fn open_connection(path: &Path) -> anyhow::Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Unable to open SQLite database at {}", path.display()))?;
    conn.busy_timeout(Duration::from_secs(3))
        .context("Failed to configure SQLite busy timeout")?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("Failed to enable SQLite WAL journal mode")?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("Failed to enable SQLite foreign key constraints")?;
    Ok(conn)
}

fn resolve_data_root() -> PathBuf {
    if let Some(mut dir) = dirs::data_local_dir() {
        dir.push(APP_NAME_DIR);
        return dir;
    }

    PathBuf::from("data")
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    })
}
