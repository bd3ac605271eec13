//! Collection settings as persisted by the admin side, and the per-run config.

use serde::{Deserialize, Serialize};

pub const DEFAULT_BOARDS: &[&str] = &["livegalileo", "news4vip"];
pub const DEFAULT_MIN_POST_COUNT: u32 = 100;
pub const DEFAULT_COLLECTION_INTERVAL_HOURS: u32 = 24;
pub const DEFAULT_MAX_THREADS: usize = 10;

/// Persisted collection settings record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionSettings {
    pub target_boards: Vec<String>,
    pub min_post_count: u32,
    /// Hours between automatic runs. Informational to the collector.
    pub collection_interval: u32,
    pub auto_collection_enabled: bool,
    /// Per-board thread cap.
    pub max_threads: usize,
    /// Cap on the merged result across boards (None = `max_threads * boards`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_total_threads: Option<usize>,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            target_boards: DEFAULT_BOARDS.iter().map(|b| b.to_string()).collect(),
            min_post_count: DEFAULT_MIN_POST_COUNT,
            collection_interval: DEFAULT_COLLECTION_INTERVAL_HOURS,
            auto_collection_enabled: true,
            max_threads: DEFAULT_MAX_THREADS,
            max_total_threads: None,
        }
    }
}

impl CollectionSettings {
    /// Freeze these settings into the config for one run.
    pub fn to_scraping_config(&self) -> ScrapingConfig {
        ScrapingConfig::new(
            self.target_boards.clone(),
            self.min_post_count,
            self.max_threads,
        )
        .with_total_cap(self.max_total_threads)
    }
}

/// Immutable configuration for one collection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapingConfig {
    boards: Vec<String>,
    min_post_count: u32,
    max_threads: usize,
    max_total_threads: Option<usize>,
}

impl ScrapingConfig {
    /// Boards keep their order; blanks and repeats are dropped.
    /// `max_threads` is clamped to at least 1.
    pub fn new(boards: Vec<String>, min_post_count: u32, max_threads: usize) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(boards.len());
        for board in boards {
            let board = board.trim().trim_matches('/').to_string();
            if !board.is_empty() && !unique.contains(&board) {
                unique.push(board);
            }
        }
        Self {
            boards: unique,
            min_post_count,
            max_threads: max_threads.max(1),
            max_total_threads: None,
        }
    }

    pub fn with_total_cap(mut self, cap: Option<usize>) -> Self {
        self.max_total_threads = cap.map(|c| c.max(1));
        self
    }

    pub fn boards(&self) -> &[String] {
        &self.boards
    }

    pub fn min_post_count(&self) -> u32 {
        self.min_post_count
    }

    /// Per-board cap.
    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Cap applied to the merged result of all boards.
    pub fn total_cap(&self) -> usize {
        self.max_total_threads
            .unwrap_or_else(|| self.max_threads * self.boards.len().max(1))
    }
}
