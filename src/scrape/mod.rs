//! Board scraping: server discovery, thread listing and post extraction.
//!
//! Control flow for one collection run:
//! `ThreadCollector` -> (per board) `BoardDirectory` -> `ServerProber` ->
//! `ThreadLister`. Posts are hydrated on demand by `PostExtractor`.
//!
//! Every failure below the collector is absorbed at the smallest scope and
//! turned into "try the next option"; callers get plain result values.

mod collector;
pub mod content;
pub mod dates;
mod directory;
mod html;
mod posts;
mod probe;
mod threads;

pub use collector::{rank_by_post_count, CollectionReport, ThreadCollector};
pub use directory::{parse_directory_page, BoardDirectory, DirectoryOrigin};
pub use posts::{parse_posts, url_variants, PostExtractor, ANONYMOUS_AUTHOR};
pub use probe::{
    classify_hop, error_mention_is_script_artifact, is_valid_board_page, Hop, LandedPage,
    ServerProber,
};
pub use threads::{
    canonical_thread_url, clean_title, count_in_text, is_plausible_post_count,
    parse_thread_index, ThreadLister,
};

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::{ScraperSettings, ScrapingConfig};
use crate::encoding::EncodingError;
use crate::http_client::{FetchError, PageFetcher};

/// A thread candidate found on a board index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedThread {
    pub title: String,
    /// Absolute, canonical thread URL. Storage upserts key on this.
    pub url: String,
    pub post_count: u32,
    pub board: String,
}

/// One post extracted from a thread page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedPost {
    /// 1-based position within the thread.
    pub sequence_number: u32,
    pub author: String,
    pub content: String,
    /// Parsed post time; extraction time when the date text is unusable.
    pub posted_at: DateTime<FixedOffset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymized_id: Option<String>,
    /// Date text as found on the page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_date_text: Option<String>,
}

/// Error type for scrape operations.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Could not decode {url}: {source}")]
    Encoding {
        url: String,
        #[source]
        source: EncodingError,
    },

    #[error("No usable board index for {0}")]
    EmptyIndex(String),
}

/// Wires the scraping components together around one fetcher and one
/// directory cache. Build once per process and share it between runs.
pub struct BoardScraper {
    directory: Arc<BoardDirectory>,
    collector: ThreadCollector,
    extractor: PostExtractor,
}

impl BoardScraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>, settings: &ScraperSettings) -> Self {
        let directory = Arc::new(BoardDirectory::new(fetcher.clone(), settings));
        Self::with_directory(fetcher, directory, settings)
    }

    /// Build around an existing directory cache.
    pub fn with_directory(
        fetcher: Arc<dyn PageFetcher>,
        directory: Arc<BoardDirectory>,
        settings: &ScraperSettings,
    ) -> Self {
        let prober = ServerProber::new(fetcher.clone(), settings);
        let lister = ThreadLister::new(fetcher.clone(), directory.clone(), prober, settings);
        Self {
            directory,
            collector: ThreadCollector::new(lister, settings.board_delay()),
            extractor: PostExtractor::new(fetcher, settings),
        }
    }

    pub fn directory(&self) -> &BoardDirectory {
        &self.directory
    }

    pub fn lister(&self) -> &ThreadLister {
        self.collector.lister()
    }

    pub async fn collect_threads(
        &self,
        config: &ScrapingConfig,
        cancel: &CancellationToken,
    ) -> CollectionReport {
        self.collector.collect_threads(config, cancel).await
    }

    pub async fn extract_posts(&self, thread_url: &str) -> Vec<ScrapedPost> {
        self.extractor.extract_posts(thread_url).await
    }
}
