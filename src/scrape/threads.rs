//! Board index parsing and thread listing.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, info, warn};
use url::Url;

use super::collector::rank_by_post_count;
use super::directory::BoardDirectory;
use super::html::flat_text;
use super::probe::ServerProber;
use super::{ScrapeError, ScrapedThread};
use crate::config::{ScraperSettings, ScrapingConfig};
use crate::encoding::decode_body;
use crate::http_client::{fetch_success, FetchRequest, PageFetcher};

/// Post counts at or above this are parse errors, not real threads.
const MAX_PLAUSIBLE_POST_COUNT: u64 = 100_000;

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static BASE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("base[href]").unwrap());

/// `.../read.cgi/{board}/{key}/...` or a bare `{key}/...` relative link.
static THREAD_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:read\.(?:cgi|so)/([A-Za-z0-9_]+)/(\d{9,11})|^(\d{9,11})(?:/|$))").unwrap()
});

/// Count annotations in order of reliability.
static COUNT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // Title (123)
        Regex::new(r"\((\d+)\)\s*$").unwrap(),
        // Title（123）
        Regex::new(r"（(\d+)）").unwrap(),
        // レス数: 123, count: 123
        Regex::new(r"(?i)(?:count|res|レス数?)\s*[:：]\s*(\d+)").unwrap(),
        // Title [123]
        Regex::new(r"\[(\d+)\]").unwrap(),
        // Title【123】
        Regex::new(r"【(\d+)】").unwrap(),
        // (123) anywhere
        Regex::new(r"\((\d+)\)").unwrap(),
    ]
});

static TITLE_NUMBER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\s*[:：]\s*").unwrap());

static TITLE_COUNT_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*(?:\(\d+\)|（\d+）|\[\d+\]|【\d+】)\s*$").unwrap());

/// Whether a parsed count can be a real post count.
pub fn is_plausible_post_count(count: u64) -> bool {
    (1..MAX_PLAUSIBLE_POST_COUNT).contains(&count)
}

/// First plausible post count annotated in `text`.
pub fn count_in_text(text: &str) -> Option<u32> {
    COUNT_PATTERNS
        .iter()
        .filter_map(|re| re.captures(text))
        .filter_map(|caps| caps[1].parse::<u64>().ok())
        .find(|&n| is_plausible_post_count(n))
        .and_then(|n| u32::try_from(n).ok())
}

/// Strip list numbering and the trailing count from anchor text.
pub fn clean_title(text: &str) -> String {
    let without_count = TITLE_COUNT_SUFFIX.replace(text, "");
    let cleaned = TITLE_NUMBER_PREFIX.replace(&without_count, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        text.trim().to_string()
    } else {
        cleaned.to_string()
    }
}

/// Canonical `{origin}/test/read.cgi/{board}/{key}/` URL for a thread link.
pub fn canonical_thread_url(base: &Url, href: &str, board: &str) -> Option<String> {
    let caps = THREAD_HREF.captures(href)?;
    let (thread_board, key) = match (caps.get(1), caps.get(2), caps.get(3)) {
        (Some(b), Some(k), _) => (b.as_str(), k.as_str()),
        (_, _, Some(k)) => (board, k.as_str()),
        _ => return None,
    };

    let origin = base.join(href).ok()?.origin();
    origin.is_tuple().then(|| {
        format!(
            "{}/test/read.cgi/{}/{}/",
            origin.ascii_serialization(),
            thread_board,
            key
        )
    })
}

fn is_thread_anchor(anchor: ElementRef<'_>) -> bool {
    anchor
        .value()
        .attr("href")
        .is_some_and(|h| THREAD_HREF.is_match(h))
}

/// Count from the parent's text, only when the parent wraps this one thread.
fn parent_count(anchor: ElementRef<'_>) -> Option<u32> {
    let parent = anchor.parent().and_then(ElementRef::wrap)?;
    let thread_anchors = parent.select(&ANCHOR).filter(|a| is_thread_anchor(*a)).count();
    if thread_anchors != 1 {
        return None;
    }
    count_in_text(&flat_text(parent))
}

/// Count from the nodes following the link, up to the next link.
/// Text before a link belongs to the previous thread.
fn sibling_count(anchor: ElementRef<'_>) -> Option<u32> {
    for sibling in anchor.next_siblings() {
        let text = match ElementRef::wrap(sibling) {
            Some(el) if el.value().name() == "a" => break,
            Some(el) => flat_text(el),
            None => match sibling.value() {
                Node::Text(text) => text.trim().to_string(),
                _ => continue,
            },
        };
        if let Some(count) = count_in_text(&text) {
            return Some(count);
        }
    }
    None
}

/// Parse every thread link on a board index page.
///
/// Links are resolved against `<base href>` when present, otherwise against
/// `page_url`. Threads are deduplicated by canonical URL; a missing or
/// implausible count becomes 0.
pub fn parse_thread_index(html: &str, page_url: &str, board: &str) -> Vec<ScrapedThread> {
    let document = Html::parse_document(html);
    let page = Url::parse(page_url).ok();
    let base = document
        .select(&BASE)
        .next()
        .and_then(|b| b.value().attr("href"))
        .and_then(|href| match page {
            Some(ref page) => page.join(href).ok(),
            None => Url::parse(href).ok(),
        })
        .or(page);
    let Some(base) = base else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut threads = Vec::new();
    for anchor in document.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let text = flat_text(anchor);
        if text.is_empty() {
            continue;
        }
        let Some(url) = canonical_thread_url(&base, href, board) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }

        let post_count = count_in_text(&text)
            .or_else(|| parent_count(anchor))
            .or_else(|| sibling_count(anchor))
            .unwrap_or(0);

        threads.push(ScrapedThread {
            title: clean_title(&text),
            url,
            post_count,
            board: board.to_string(),
        });
    }

    threads
}

/// Lists popular threads for a board, on a server that actually answers.
pub struct ThreadLister {
    fetcher: Arc<dyn PageFetcher>,
    directory: Arc<BoardDirectory>,
    prober: ServerProber,
    fallback_servers: Vec<String>,
    timeout: Duration,
}

impl ThreadLister {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        directory: Arc<BoardDirectory>,
        prober: ServerProber,
        settings: &ScraperSettings,
    ) -> Self {
        Self {
            fetcher,
            directory,
            prober,
            fallback_servers: settings.fallback_servers.clone(),
            timeout: settings.fetch_timeout(),
        }
    }

    /// Resolve and probe a server for `board`.
    ///
    /// Tries the directory's answer, then the fallback servers in order.
    /// When none validates the directory's answer is returned unconfirmed.
    pub async fn confirmed_server(&self, board: &str) -> String {
        let candidate = self.directory.resolve_server(board).await;
        if let Some(server) = self.prober.confirm_server(&candidate, board).await {
            if server != candidate {
                info!("{} moved from {} to {}", board, candidate, server);
            }
            self.directory.confirm(board, &server).await;
            return server;
        }

        for fallback in &self.fallback_servers {
            if fallback.trim_end_matches('/') == candidate.trim_end_matches('/') {
                continue;
            }
            if let Some(server) = self.prober.confirm_server(fallback, board).await {
                info!("{} found on fallback server {}", board, server);
                self.directory.confirm(board, &server).await;
                return server;
            }
        }

        warn!("No server validated for {}, trying {} unconfirmed", board, candidate);
        candidate
    }

    /// Threads on `board` with at least the configured post count, most
    /// active first, capped at the per-board limit.
    pub async fn try_list_threads(
        &self,
        board: &str,
        config: &ScrapingConfig,
    ) -> Result<Vec<ScrapedThread>, ScrapeError> {
        let server = self.confirmed_server(board).await;
        let board_url = format!("{}/{}/", server.trim_end_matches('/'), board);

        let mut last_error = None;
        for index_url in [format!("{}subback.html", board_url), board_url] {
            match self.fetch_index(&index_url, board).await {
                Ok(mut threads) if !threads.is_empty() => {
                    let found = threads.len();
                    threads.retain(|t| t.post_count >= config.min_post_count());
                    rank_by_post_count(&mut threads, config.max_threads());
                    debug!(
                        "{}: {} threads on index, {} kept",
                        board,
                        found,
                        threads.len()
                    );
                    return Ok(threads);
                }
                Ok(_) => debug!("No thread links on {}", index_url),
                Err(e) => {
                    debug!("Index {} failed: {}", index_url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ScrapeError::EmptyIndex(board.to_string())))
    }

    /// Like [`Self::try_list_threads`], with failures logged and flattened
    /// into an empty list.
    pub async fn list_threads(&self, board: &str, config: &ScrapingConfig) -> Vec<ScrapedThread> {
        match self.try_list_threads(board, config).await {
            Ok(threads) => threads,
            Err(e) => {
                warn!("Listing {} failed: {}", board, e);
                Vec::new()
            }
        }
    }

    async fn fetch_index(
        &self,
        index_url: &str,
        board: &str,
    ) -> Result<Vec<ScrapedThread>, ScrapeError> {
        let request = FetchRequest::get(index_url, self.timeout);
        let page = fetch_success(self.fetcher.as_ref(), &request).await?;
        let html =
            decode_body(&page.body, page.content_type()).map_err(|source| ScrapeError::Encoding {
                url: page.url.clone(),
                source,
            })?;
        Ok(parse_thread_index(&html, &page.url, board))
    }
}
