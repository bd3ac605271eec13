//! Collection runs and post hydration wired to storage.

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::CollectionSettings;
use crate::scrape::{BoardScraper, CollectionReport};
use crate::storage::{SettingsRepository, StorageError, StoredPost, StoredThread, ThreadRepository};

/// Per-run adjustments on top of the stored collection settings.
#[derive(Debug, Clone, Default)]
pub struct CollectionOverrides {
    pub boards: Vec<String>,
    pub min_post_count: Option<u32>,
    pub max_threads: Option<usize>,
    pub max_total_threads: Option<usize>,
}

impl CollectionOverrides {
    pub fn apply(&self, settings: &CollectionSettings) -> CollectionSettings {
        let mut settings = settings.clone();
        if !self.boards.is_empty() {
            settings.target_boards = self.boards.clone();
        }
        if let Some(min) = self.min_post_count {
            settings.min_post_count = min;
        }
        if let Some(max) = self.max_threads {
            settings.max_threads = max;
        }
        if self.max_total_threads.is_some() {
            settings.max_total_threads = self.max_total_threads;
        }
        settings
    }
}

/// What a collection run produced.
#[derive(Debug, Clone)]
pub struct CollectionOutcome {
    pub report: CollectionReport,
    /// Threads not seen before this run.
    pub new_threads: usize,
}

impl CollectionOutcome {
    pub fn nothing_collected(&self) -> bool {
        self.report.is_empty()
    }
}

/// Whether an automatic run is due under `settings`.
pub fn collection_due(
    settings: &CollectionSettings,
    last_collection_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    if !settings.auto_collection_enabled {
        return false;
    }
    match last_collection_at {
        Some(last) => now - last >= Duration::hours(i64::from(settings.collection_interval)),
        None => true,
    }
}

/// Scraper plus the repositories it feeds.
pub struct Pipeline {
    scraper: BoardScraper,
    threads: ThreadRepository,
    settings: SettingsRepository,
    defaults: CollectionSettings,
}

impl Pipeline {
    /// `defaults` apply while the database holds no collection settings.
    pub fn new(
        scraper: BoardScraper,
        threads: ThreadRepository,
        settings: SettingsRepository,
        defaults: CollectionSettings,
    ) -> Self {
        Self {
            scraper,
            threads,
            settings,
            defaults,
        }
    }

    pub fn scraper(&self) -> &BoardScraper {
        &self.scraper
    }

    pub fn threads(&self) -> &ThreadRepository {
        &self.threads
    }

    pub fn settings(&self) -> &SettingsRepository {
        &self.settings
    }

    /// Effective collection settings: stored record or configured defaults.
    /// An unreadable stored record also yields the defaults.
    pub fn collection_settings(&self) -> Result<CollectionSettings, StorageError> {
        match self.settings.load_or(&self.defaults) {
            Err(StorageError::Settings(e)) => {
                warn!("Stored collection settings are unreadable, using defaults: {}", e);
                Ok(self.defaults.clone())
            }
            other => other,
        }
    }

    pub fn is_collection_due(&self, now: DateTime<Utc>) -> Result<bool, StorageError> {
        let settings = self.collection_settings()?;
        Ok(collection_due(
            &settings,
            self.settings.last_collection_at()?,
            now,
        ))
    }

    /// Collect threads across boards and store them.
    ///
    /// An empty result is a normal outcome. The run is recorded as the last
    /// collection only when it finished and at least one board answered.
    pub async fn run_collection(
        &self,
        overrides: &CollectionOverrides,
        cancel: &CancellationToken,
    ) -> Result<CollectionOutcome, StorageError> {
        let settings = self.collection_settings()?;
        let config = overrides.apply(&settings).to_scraping_config();
        info!(
            "Collecting from {} (min {} posts, {} per board)",
            config.boards().join(", "),
            config.min_post_count(),
            config.max_threads()
        );

        let report = self.scraper.collect_threads(&config, cancel).await;
        let new_threads = self.threads.upsert_threads(&report.threads)?;

        if report.is_empty() {
            warn!("Nothing collected");
        } else {
            info!(
                "Stored {} threads ({} new)",
                report.threads.len(),
                new_threads
            );
        }

        if !report.cancelled && !report.boards_succeeded.is_empty() {
            self.settings.mark_collected(Utc::now())?;
        }

        Ok(CollectionOutcome {
            report,
            new_threads,
        })
    }

    /// Posts for a stored thread, extracting them on first access.
    ///
    /// With `refresh` the thread is re-extracted even if posts are stored.
    /// A failed extraction leaves stored posts untouched.
    pub async fn hydrate_posts(
        &self,
        thread: &StoredThread,
        refresh: bool,
    ) -> Result<Vec<StoredPost>, StorageError> {
        if thread.posts_fetched_at.is_some() && !refresh {
            return self.threads.posts(thread.id);
        }

        let posts = self.scraper.extract_posts(&thread.url).await;
        if posts.is_empty() {
            warn!("No posts extracted from {}", thread.url);
        } else {
            let new_posts = self.threads.save_posts(thread.id, &posts)?;
            info!("Saved {} posts ({} new) for {}", posts.len(), new_posts, thread.url);
        }

        self.threads.posts(thread.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_on_top_of_settings() {
        let base = CollectionSettings::default();
        let overrides = CollectionOverrides {
            boards: vec!["newsplus".into()],
            min_post_count: Some(5),
            ..Default::default()
        };
        let applied = overrides.apply(&base);
        assert_eq!(applied.target_boards, vec!["newsplus"]);
        assert_eq!(applied.min_post_count, 5);
        assert_eq!(applied.max_threads, base.max_threads);
    }

    #[test]
    fn test_collection_due() {
        let settings = CollectionSettings::default();
        let now = Utc::now();
        assert!(collection_due(&settings, None, now));
        assert!(!collection_due(&settings, Some(now - Duration::hours(2)), now));
        assert!(collection_due(&settings, Some(now - Duration::hours(24)), now));

        let disabled = CollectionSettings {
            auto_collection_enabled: false,
            ..Default::default()
        };
        assert!(!collection_due(&disabled, None, now));
    }
}
