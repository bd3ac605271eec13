//! Collection settings repository.
//!
//! Settings live in a single row so the admin side and the collector agree
//! on one record. The row can exist with no settings when only a collection
//! time has been recorded.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{parse_datetime_opt, Result};
use crate::config::CollectionSettings;

pub struct SettingsRepository {
    db_path: PathBuf,
}

impl SettingsRepository {
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS collection_settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                data TEXT,
                updated_at TEXT NOT NULL,
                last_collection_at TEXT
            );
        "#,
        )?;
        Ok(())
    }

    /// The stored settings, if any were ever saved.
    pub fn load(&self) -> Result<Option<CollectionSettings>> {
        let conn = self.connect()?;
        let data: Option<Option<String>> = conn
            .query_row(
                "SELECT data FROM collection_settings WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match data.flatten() {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    /// Stored settings, or `fallback` when nothing is stored yet.
    pub fn load_or(&self, fallback: &CollectionSettings) -> Result<CollectionSettings> {
        Ok(self.load()?.unwrap_or_else(|| fallback.clone()))
    }

    pub fn save(&self, settings: &CollectionSettings) -> Result<()> {
        let conn = self.connect()?;
        let data = serde_json::to_string(settings)?;
        conn.execute(
            r#"
            INSERT INTO collection_settings (id, data, updated_at)
            VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
            params![data, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn last_collection_at(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.connect()?;
        let value: Option<Option<String>> = conn
            .query_row(
                "SELECT last_collection_at FROM collection_settings WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(parse_datetime_opt(value.flatten()))
    }

    /// Record a completed collection run. Stored settings are left as they
    /// are; none are written when nothing was saved yet.
    pub fn mark_collected(&self, at: DateTime<Utc>) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO collection_settings (id, data, updated_at, last_collection_at)
            VALUES (1, NULL, ?1, ?1)
            ON CONFLICT(id) DO UPDATE SET last_collection_at = excluded.last_collection_at
            "#,
            params![at.to_rfc3339()],
        )?;
        Ok(())
    }
}
