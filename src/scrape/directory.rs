//! Board directory: which server hosts which board.
//!
//! The directory is scraped from public board index pages and cached for a
//! TTL. Resolution never fails; when every source is down the answer
//! degrades to a built-in table and finally to a default server.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use regex::Regex;
use scraper::{Html, Selector};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::ScrapeError;
use crate::config::ScraperSettings;
use crate::encoding::decode_body;
use crate::http_client::{fetch_success, FetchRequest, PageFetcher};

static ABSOLUTE_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="://"]"#).unwrap());

static BOARD_SEGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

/// Hosts under the server domain that are portals, not board servers.
const PORTAL_HOST_PREFIXES: &[&str] = &["www.", "menu.", "info.", "search."];

/// First path segments that never name a board.
const NON_BOARD_SEGMENTS: &[&str] = &["test", "bbs", "index", "_403"];

/// Where the current directory entries came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryOrigin {
    /// Nothing loaded yet.
    Empty,
    /// Parsed from this source URL.
    Source(String),
    /// Built-in fallback table.
    Fallback,
}

#[derive(Debug)]
struct DirectoryState {
    entries: HashMap<String, String>,
    origin: DirectoryOrigin,
    refreshed_at: Option<Instant>,
    /// Per-board answers, including servers confirmed by probing.
    /// Cleared with every refresh so overrides age out with the directory.
    servers: HashMap<String, String>,
}

impl DirectoryState {
    fn is_expired(&self, ttl: Duration) -> bool {
        match self.refreshed_at {
            Some(at) => at.elapsed() >= ttl,
            None => true,
        }
    }
}

/// Cached board -> server map shared by all lister calls.
pub struct BoardDirectory {
    fetcher: Arc<dyn PageFetcher>,
    sources: Vec<String>,
    server_domain: String,
    fallback_boards: BTreeMap<String, String>,
    default_server: String,
    ttl: Duration,
    timeout: Duration,
    state: Mutex<DirectoryState>,
}

impl BoardDirectory {
    pub fn new(fetcher: Arc<dyn PageFetcher>, settings: &ScraperSettings) -> Self {
        Self {
            fetcher,
            sources: settings.directory_sources.clone(),
            server_domain: settings.server_domain.clone(),
            fallback_boards: settings.fallback_boards.clone(),
            default_server: settings.default_server.clone(),
            ttl: settings.directory_ttl(),
            timeout: settings.fetch_timeout(),
            state: Mutex::new(DirectoryState {
                entries: HashMap::new(),
                origin: DirectoryOrigin::Empty,
                refreshed_at: None,
                servers: HashMap::new(),
            }),
        }
    }

    /// Best-known server base URL for a board (e.g. `https://viper.2ch.sc`).
    pub async fn resolve_server(&self, board: &str) -> String {
        let mut state = self.state.lock().await;
        if state.is_expired(self.ttl) {
            self.refresh(&mut state).await;
        }

        if let Some(server) = state.servers.get(board) {
            return server.clone();
        }

        let server = match state.entries.get(board) {
            Some(server) => server.clone(),
            None => match self.fallback_boards.get(board) {
                Some(server) => {
                    debug!("{} not in directory, using fallback table", board);
                    server.clone()
                }
                None => {
                    warn!(
                        "No server known for {}, guessing {}",
                        board, self.default_server
                    );
                    self.default_server.clone()
                }
            },
        };
        state.servers.insert(board.to_string(), server.clone());
        server
    }

    /// Record a server confirmed by probing; it wins until the next refresh.
    pub async fn confirm(&self, board: &str, server: &str) {
        let mut state = self.state.lock().await;
        state.servers.insert(board.to_string(), server.to_string());
    }

    /// Current directory entries, refreshing first if stale.
    pub async fn entries(&self) -> (BTreeMap<String, String>, DirectoryOrigin) {
        let mut state = self.state.lock().await;
        if state.is_expired(self.ttl) {
            self.refresh(&mut state).await;
        }
        let entries = state
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        (entries, state.origin.clone())
    }

    /// Force the next lookup to refetch.
    pub async fn invalidate(&self) {
        self.state.lock().await.refreshed_at = None;
    }

    async fn refresh(&self, state: &mut DirectoryState) {
        state.servers.clear();
        state.refreshed_at = Some(Instant::now());

        for source in &self.sources {
            match self.load_source(source).await {
                Ok(entries) if !entries.is_empty() => {
                    info!("Loaded {} boards from {}", entries.len(), source);
                    state.entries = entries.into_iter().collect();
                    state.origin = DirectoryOrigin::Source(source.clone());
                    return;
                }
                Ok(_) => debug!("No board links on {}", source),
                Err(e) => debug!("Directory source {} failed: {}", source, e),
            }
        }

        if matches!(state.origin, DirectoryOrigin::Source(_)) && !state.entries.is_empty() {
            warn!("All directory sources failed, keeping previous directory");
            return;
        }

        warn!("All directory sources failed, using built-in board table");
        state.entries = self
            .fallback_boards
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        state.origin = DirectoryOrigin::Fallback;
    }

    async fn load_source(&self, source: &str) -> Result<Vec<(String, String)>, ScrapeError> {
        let request = FetchRequest::get(source, self.timeout);
        let page = fetch_success(self.fetcher.as_ref(), &request).await?;
        let html =
            decode_body(&page.body, page.content_type()).map_err(|source| ScrapeError::Encoding {
                url: page.url.clone(),
                source,
            })?;
        Ok(parse_directory_page(&html, &self.server_domain))
    }
}

/// Extract `(board, server)` pairs from a board index page.
///
/// Only absolute links to hosts under `server_domain` count. The first
/// path segment is the board; the first link seen for a board wins.
pub fn parse_directory_page(html: &str, server_domain: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    let mut seen: Vec<(String, String)> = Vec::new();

    for link in document.select(&ABSOLUTE_LINK) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some((board, server)) = board_link(href, server_domain) else {
            continue;
        };
        if !seen.iter().any(|(b, _)| *b == board) {
            seen.push((board, server));
        }
    }

    seen
}

fn board_link(href: &str, server_domain: &str) -> Option<(String, String)> {
    let url = Url::parse(href.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();

    let under_domain = host
        .strip_suffix(server_domain)
        .is_some_and(|prefix| prefix.ends_with('.'));
    if !under_domain || PORTAL_HOST_PREFIXES.iter().any(|p| host.starts_with(p)) {
        return None;
    }

    let board = url.path_segments()?.find(|s| !s.is_empty())?;
    if !BOARD_SEGMENT.is_match(board) || NON_BOARD_SEGMENTS.contains(&board) {
        return None;
    }

    Some((board.to_string(), format!("https://{}", host)))
}
