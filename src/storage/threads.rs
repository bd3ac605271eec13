//! Thread and post repository.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::{parse_datetime, parse_datetime_opt, parse_local_datetime, Result, StorageError};
use crate::scrape::{ScrapedPost, ScrapedThread};

/// A thread row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredThread {
    pub id: i64,
    pub url: String,
    pub board: String,
    pub title: String,
    pub post_count: u32,
    /// `active` while the thread keeps showing up in collections.
    pub status: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// When posts were last extracted; None until first hydration.
    pub posts_fetched_at: Option<DateTime<Utc>>,
}

/// A post row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPost {
    pub thread_id: i64,
    pub post_number: u32,
    pub author: String,
    pub content: String,
    pub posted_at: DateTime<FixedOffset>,
    pub anonymized_id: Option<String>,
    pub raw_date_text: Option<String>,
}

const THREAD_COLUMNS: &str =
    "id, url, board, title, post_count, status, first_seen_at, last_seen_at, posts_fetched_at";

/// Status written for every thread seen by a collection run.
pub const ACTIVE_STATUS: &str = "active";

fn row_to_thread(row: &Row) -> rusqlite::Result<StoredThread> {
    Ok(StoredThread {
        id: row.get("id")?,
        url: row.get("url")?,
        board: row.get("board")?,
        title: row.get("title")?,
        post_count: row.get("post_count")?,
        status: row.get("status")?,
        first_seen_at: parse_datetime(&row.get::<_, String>("first_seen_at")?),
        last_seen_at: parse_datetime(&row.get::<_, String>("last_seen_at")?),
        posts_fetched_at: parse_datetime_opt(row.get("posts_fetched_at")?),
    })
}

fn row_to_post(row: &Row) -> rusqlite::Result<StoredPost> {
    Ok(StoredPost {
        thread_id: row.get("thread_id")?,
        post_number: row.get("post_number")?,
        author: row.get("author")?,
        content: row.get("content")?,
        posted_at: parse_local_datetime(&row.get::<_, String>("posted_at")?),
        anonymized_id: row.get("anonymized_id")?,
        raw_date_text: row.get("raw_date_text")?,
    })
}

/// SQLite-backed store of collected threads and their posts.
pub struct ThreadRepository {
    db_path: PathBuf,
}

impl ThreadRepository {
    /// Open the repository, creating tables as needed.
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
            CREATE TABLE IF NOT EXISTS threads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                board TEXT NOT NULL,
                title TEXT NOT NULL,
                post_count INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'active',
                first_seen_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL,
                posts_fetched_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_threads_board ON threads(board);
            CREATE INDEX IF NOT EXISTS idx_threads_post_count ON threads(post_count DESC);

            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id INTEGER NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                post_number INTEGER NOT NULL,
                author TEXT NOT NULL,
                content TEXT NOT NULL,
                posted_at TEXT NOT NULL,
                anonymized_id TEXT,
                raw_date_text TEXT,
                UNIQUE(thread_id, post_number)
            );
        "#,
        )?;
        Ok(())
    }

    /// Insert or refresh threads keyed by URL. Returns how many were new.
    pub fn upsert_threads(&self, threads: &[ScrapedThread]) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let before: i64 = tx.query_row("SELECT COUNT(*) FROM threads", [], |row| row.get(0))?;
        let now = Utc::now().to_rfc3339();

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO threads (url, board, title, post_count, status, first_seen_at, last_seen_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                ON CONFLICT(url) DO UPDATE SET
                    board = excluded.board,
                    title = excluded.title,
                    post_count = excluded.post_count,
                    status = excluded.status,
                    last_seen_at = excluded.last_seen_at
                "#,
            )?;
            for thread in threads {
                stmt.execute(params![
                    thread.url,
                    thread.board,
                    thread.title,
                    thread.post_count,
                    ACTIVE_STATUS,
                    now
                ])?;
            }
        }

        let after: i64 = tx.query_row("SELECT COUNT(*) FROM threads", [], |row| row.get(0))?;
        tx.commit()?;

        let inserted = usize::try_from(after - before).unwrap_or(0);
        debug!("Upserted {} threads ({} new)", threads.len(), inserted);
        Ok(inserted)
    }

    pub fn get(&self, id: i64) -> Result<Option<StoredThread>> {
        let conn = self.connect()?;
        let thread = conn
            .query_row(
                &format!("SELECT {} FROM threads WHERE id = ?", THREAD_COLUMNS),
                params![id],
                row_to_thread,
            )
            .optional()?;
        Ok(thread)
    }

    pub fn get_by_url(&self, url: &str) -> Result<Option<StoredThread>> {
        let conn = self.connect()?;
        let thread = conn
            .query_row(
                &format!("SELECT {} FROM threads WHERE url = ?", THREAD_COLUMNS),
                params![url],
                row_to_thread,
            )
            .optional()?;
        Ok(thread)
    }

    /// Stored threads, most posts first, optionally for one board.
    pub fn list(&self, board: Option<&str>, limit: usize) -> Result<Vec<StoredThread>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM threads
             WHERE (?1 IS NULL OR board = ?1)
             ORDER BY post_count DESC, last_seen_at DESC
             LIMIT ?2",
            THREAD_COLUMNS
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let threads = stmt
            .query_map(params![board, limit], row_to_thread)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(threads)
    }

    /// Posts of a thread in post-number order.
    pub fn posts(&self, thread_id: i64) -> Result<Vec<StoredPost>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT thread_id, post_number, author, content, posted_at, anonymized_id, raw_date_text
             FROM posts WHERE thread_id = ? ORDER BY post_number",
        )?;
        let posts = stmt
            .query_map(params![thread_id], row_to_post)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(posts)
    }

    /// Store extracted posts, replacing rows with the same post number, and
    /// stamp the thread as fetched. The thread's post count is raised to the
    /// stored post count when that is larger. Returns how many posts were new.
    pub fn save_posts(&self, thread_id: i64, posts: &[ScrapedPost]) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let exists: bool = tx
            .query_row("SELECT 1 FROM threads WHERE id = ?", params![thread_id], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Err(StorageError::ThreadNotFound(thread_id));
        }

        let count_posts = |conn: &Connection| -> rusqlite::Result<i64> {
            conn.query_row(
                "SELECT COUNT(*) FROM posts WHERE thread_id = ?",
                params![thread_id],
                |row| row.get(0),
            )
        };
        let before = count_posts(&tx)?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO posts
                    (thread_id, post_number, author, content, posted_at, anonymized_id, raw_date_text)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(thread_id, post_number) DO UPDATE SET
                    author = excluded.author,
                    content = excluded.content,
                    posted_at = excluded.posted_at,
                    anonymized_id = excluded.anonymized_id,
                    raw_date_text = excluded.raw_date_text
                "#,
            )?;
            for post in posts {
                stmt.execute(params![
                    thread_id,
                    post.sequence_number,
                    post.author,
                    post.content,
                    post.posted_at.to_rfc3339(),
                    post.anonymized_id,
                    post.raw_date_text
                ])?;
            }
        }

        let after = count_posts(&tx)?;
        tx.execute(
            "UPDATE threads SET posts_fetched_at = ?1, post_count = MAX(post_count, ?2) WHERE id = ?3",
            params![Utc::now().to_rfc3339(), after, thread_id],
        )?;
        tx.commit()?;

        Ok(usize::try_from(after - before).unwrap_or(0))
    }
}
