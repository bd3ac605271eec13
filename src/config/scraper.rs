//! Scraper tuning: timeouts, directory sources, fallbacks and page validation.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Board index pages that list board links, in priority order.
pub const DEFAULT_DIRECTORY_SOURCES: &[&str] = &[
    "https://www.5ch.net/",
    "https://www.2ch.sc/",
    "https://menu.5ch.net/bbstable.html",
    "https://menu.2ch.sc/bbstable.html",
];

/// Server used when nothing else resolves.
pub const DEFAULT_SERVER: &str = "https://tomcat.2ch.sc";

/// Settings for the scraping pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperSettings {
    /// User agent configuration (None, "impersonate", or a custom string).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Timeout for server probe requests, in seconds.
    pub probe_timeout_secs: u64,
    /// Timeout for directory, board index and thread fetches, in seconds.
    pub fetch_timeout_secs: u64,
    /// Pause between boards in one collection run, in milliseconds.
    pub board_delay_ms: u64,
    /// Base per-host delay applied by the rate limiter, in milliseconds.
    pub request_delay_ms: u64,
    /// How long a fetched board directory stays valid, in hours.
    pub directory_ttl_hours: u64,
    /// Board index pages to build the directory from, in priority order.
    pub directory_sources: Vec<String>,
    /// Only links on hosts under this domain count as board servers.
    pub server_domain: String,
    /// Known-good servers for common boards, used when no source answers.
    pub fallback_boards: BTreeMap<String, String>,
    /// Servers probed in order when the resolved server does not validate.
    pub fallback_servers: Vec<String>,
    /// Last-resort server guess.
    pub default_server: String,
    /// Maximum redirect hops followed while probing a server.
    pub max_redirects: usize,
    /// A URL-variant result larger than this stops the variant search.
    pub good_enough_posts: usize,
    /// Posts whose cleaned text is shorter than this are noise.
    pub min_content_chars: usize,
    pub validation: PageValidationRules,
}

impl ScraperSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn board_delay(&self) -> Duration {
        Duration::from_millis(self.board_delay_ms)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn directory_ttl(&self) -> Duration {
        Duration::from_secs(self.directory_ttl_hours * 60 * 60)
    }
}

impl Default for ScraperSettings {
    fn default() -> Self {
        let fallback_boards = [
            ("livegalileo", "https://tomcat.2ch.sc"),
            ("news4vip", "https://viper.2ch.sc"),
            ("newsplus", "https://egg.2ch.sc"),
        ]
        .into_iter()
        .map(|(board, server)| (board.to_string(), server.to_string()))
        .collect();

        Self {
            user_agent: None,
            probe_timeout_secs: 5,
            fetch_timeout_secs: 15,
            board_delay_ms: 1000,
            request_delay_ms: 250,
            directory_ttl_hours: 24,
            directory_sources: DEFAULT_DIRECTORY_SOURCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            server_domain: "2ch.sc".to_string(),
            fallback_boards,
            fallback_servers: vec![
                "https://tomcat.2ch.sc".to_string(),
                "https://viper.2ch.sc".to_string(),
                "https://egg.2ch.sc".to_string(),
                "https://hayabusa9.2ch.sc".to_string(),
            ],
            default_server: DEFAULT_SERVER.to_string(),
            max_redirects: 3,
            good_enough_posts: 50,
            min_content_chars: 3,
            validation: PageValidationRules::default(),
        }
    }
}

/// Rules deciding whether a fetched page is a real board index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageValidationRules {
    /// Pages shorter than this many bytes are rejected outright.
    pub min_page_bytes: usize,
    /// Case-insensitive phrases that mark error, denial or moved pages.
    pub denied_phrases: Vec<String>,
    /// Case-insensitive substrings typical of a genuine board index.
    pub board_markers: Vec<String>,
    /// How many distinct markers must appear.
    pub required_markers: usize,
}

impl Default for PageValidationRules {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            min_page_bytes: 1024,
            denied_phrases: strings(&[
                "404 not found",
                "403 forbidden",
                "access denied",
                "service unavailable",
                "該当する板は存在しません",
                "板が見つかりません",
                "このページは存在しません",
                "アクセス規制中",
                "ただいま混雑しています",
            ]),
            board_markers: strings(&[
                "read.cgi",
                "subback.html",
                "<dl",
                "スレッド",
                "書き込",
                "setting.txt",
            ]),
            required_markers: 2,
        }
    }
}
