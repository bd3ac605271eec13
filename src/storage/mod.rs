//! SQLite persistence for collected threads, posts and collection settings.

mod settings;
mod threads;

pub use settings::SettingsRepository;
pub use threads::{StoredPost, StoredThread, ThreadRepository, ACTIVE_STATUS};

use std::path::Path;

use chrono::{DateTime, FixedOffset, Utc};
use rusqlite::Connection;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid stored settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("Thread {0} not found")]
    ThreadNotFound(i64),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Open a connection with the pragmas every repository expects.
pub(crate) fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(conn)
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse a stored post time, keeping its original offset.
pub fn parse_local_datetime(s: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(s).unwrap_or_else(|_| DateTime::UNIX_EPOCH.fixed_offset())
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
