//! Server probing: follow redirects by hand and validate the landing page.
//!
//! Board servers move. A stale server usually answers with a 3xx, a meta
//! refresh or a script redirect to the new host, or with an error page that
//! still returns 200. The prober walks those hops itself and only reports a
//! server whose final page looks like a real board index.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::config::{PageValidationRules, ScraperSettings};
use crate::encoding::decode_body;
use crate::http_client::{FetchRequest, FetchedPage, PageFetcher};

static META_REFRESH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<meta[^>]*http-equiv\s*=\s*["']?refresh["']?[^>]*content\s*=\s*["']?\s*\d*\s*;?\s*url\s*=\s*['"]?([^"'>\s]+)"#,
    )
    .unwrap()
});

static META_REFRESH_CONTENT_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<meta[^>]*content\s*=\s*["']?\s*\d*\s*;?\s*url\s*=\s*['"]?([^"'>\s]+)[^>]*http-equiv\s*=\s*["']?refresh"#,
    )
    .unwrap()
});

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>(.*?)</script>").unwrap());

static SCRIPT_REDIRECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:(?:window|document|top|self)\.)?location(?:\.href)?\s*=\s*["']([^"']+)["']|location\.replace\(\s*["']([^"']+)["']\s*\)"#,
    )
    .unwrap()
});

/// Result of inspecting one fetched hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hop {
    /// The page points somewhere else; fetch this absolute URL next.
    Next(String),
    /// The page is where we landed.
    Terminal,
}

/// Decide whether a response redirects, via HTTP status or embedded markup.
pub fn classify_hop(current_url: &str, page: &FetchedPage, body: &str) -> Hop {
    let target = if page.is_redirect() {
        page.location().map(str::to_string)
    } else if page.is_success() {
        embedded_redirect(body)
    } else {
        None
    };

    match target.and_then(|t| resolve_against(current_url, &t)) {
        Some(next) if next != current_url => Hop::Next(next),
        _ => Hop::Terminal,
    }
}

fn embedded_redirect(body: &str) -> Option<String> {
    let meta = META_REFRESH
        .captures(body)
        .or_else(|| META_REFRESH_CONTENT_FIRST.captures(body))
        .map(|c| c[1].to_string());
    if meta.is_some() {
        return meta;
    }

    SCRIPT_BLOCK.captures_iter(body).find_map(|block| {
        SCRIPT_REDIRECT
            .captures(&block[1])
            .and_then(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| m.as_str().to_string())
    })
}

fn resolve_against(base: &str, target: &str) -> Option<String> {
    let target = target.trim();
    match Url::parse(base) {
        Ok(base) => base.join(target).ok().map(|u| u.to_string()),
        Err(_) => Url::parse(target).ok().map(|u| u.to_string()),
    }
}

/// Whether a page looks like a genuine board index.
pub fn is_valid_board_page(html: &str, rules: &PageValidationRules) -> bool {
    if html.len() < rules.min_page_bytes {
        debug!("Page too short ({} bytes)", html.len());
        return false;
    }

    let lower = html.to_lowercase();
    if let Some(phrase) = rules
        .denied_phrases
        .iter()
        .find(|p| lower.contains(&p.to_lowercase()))
    {
        debug!("Page contains denial phrase {:?}", phrase);
        return false;
    }

    if lower
        .match_indices("error")
        .any(|(idx, _)| !error_mention_is_script_artifact(&lower, idx))
    {
        debug!("Page mentions an error outside scripts");
        return false;
    }

    let markers = rules
        .board_markers
        .iter()
        .filter(|m| lower.contains(&m.to_lowercase()))
        .count();
    markers >= rules.required_markers
}

/// Whether the "error" at byte `idx` of lower-cased `html` belongs to
/// script or image error handling rather than visible page text.
///
/// Board pages routinely carry `onerror=` handlers on thumbnails and
/// `console.error` calls in their scripts. `idx` is clamped to the text and
/// moved back to a character boundary.
pub fn error_mention_is_script_artifact(html: &str, idx: usize) -> bool {
    let idx = floor_char_boundary(html, idx.min(html.len()));
    let before = &html[..idx];

    if before.ends_with("on") || before.ends_with('.') || before.ends_with('_') {
        return true;
    }

    let last_open = before.rfind("<script");
    let last_close = before.rfind("</script");
    if let Some(open) = last_open {
        if last_close.is_none_or(|close| close < open) {
            return true;
        }
    }

    let window_start = floor_char_boundary(html, idx.saturating_sub(40));
    let window_end = floor_char_boundary(html, (idx + 40).min(html.len()));
    let window = &html[window_start..window_end];
    window.contains("<img") || window.contains("this.src")
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// A page the prober landed on after following redirects.
#[derive(Debug, Clone)]
pub struct LandedPage {
    pub url: String,
    pub body: String,
}

/// Confirms that a candidate server actually serves a board.
pub struct ServerProber {
    fetcher: Arc<dyn PageFetcher>,
    timeout: Duration,
    max_redirects: usize,
    rules: PageValidationRules,
}

impl ServerProber {
    pub fn new(fetcher: Arc<dyn PageFetcher>, settings: &ScraperSettings) -> Self {
        Self {
            fetcher,
            timeout: settings.probe_timeout(),
            max_redirects: settings.max_redirects,
            rules: settings.validation.clone(),
        }
    }

    /// Probe `{candidate}/{board}/` and return the scheme and host of the
    /// page that validated, or `None`.
    pub async fn confirm_server(&self, candidate: &str, board: &str) -> Option<String> {
        let start = format!("{}/{}/", candidate.trim_end_matches('/'), board);
        let landed = self.follow_redirects(&start, self.max_redirects).await?;

        if !is_valid_board_page(&landed.body, &self.rules) {
            debug!("{} did not validate as a board page", landed.url);
            return None;
        }

        let origin = Url::parse(&landed.url).ok()?.origin();
        origin.is_tuple().then(|| origin.ascii_serialization())
    }

    /// Follow HTTP and embedded redirects for at most `max_hops` hops.
    ///
    /// Returns the final successful page, or `None` on failure, a non-2xx
    /// terminal response, or too many hops.
    pub async fn follow_redirects(&self, initial_url: &str, max_hops: usize) -> Option<LandedPage> {
        let mut url = initial_url.to_string();

        for hop in 0..=max_hops {
            let (page, body) = self.fetch_hop(&url).await?;
            match classify_hop(&url, &page, &body) {
                Hop::Next(next) => {
                    if hop == max_hops {
                        warn!("Giving up on {} after {} redirects", initial_url, max_hops);
                        return None;
                    }
                    debug!("{} redirects to {}", url, next);
                    url = next;
                }
                Hop::Terminal if page.is_success() => return Some(LandedPage { url, body }),
                Hop::Terminal => {
                    debug!("{} answered {}", url, page.status);
                    return None;
                }
            }
        }

        None
    }

    /// HEAD first, GET only when there is a page worth reading.
    async fn fetch_hop(&self, url: &str) -> Option<(FetchedPage, String)> {
        let head = FetchRequest::head(url, self.timeout).without_redirects();
        match self.fetcher.fetch(&head).await {
            Ok(page) if page.is_redirect() && page.location().is_some() => {
                return Some((page, String::new()));
            }
            Ok(page) if page.is_success() || page.is_method_unsupported() => {}
            Ok(page) => {
                debug!("HEAD {} -> {}", url, page.status);
                return Some((page, String::new()));
            }
            Err(e) => debug!("HEAD {} failed, retrying with GET: {}", url, e),
        }

        let get = FetchRequest::get(url, self.timeout).without_redirects();
        let page = match self.fetcher.fetch(&get).await {
            Ok(page) => page,
            Err(e) => {
                debug!("GET {} failed: {}", url, e);
                return None;
            }
        };

        let body = match decode_body(&page.body, page.content_type()) {
            Ok(body) => body,
            Err(e) => {
                debug!("Undecodable body from {}: {}", url, e);
                return None;
            }
        };
        Some((page, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn board_page(extra: &str) -> String {
        let threads: String = (0..40)
            .map(|i| {
                format!(
                    "<a href=\"../test/read.cgi/news4vip/17000000{:02}/l50\">{}: スレッド ({})</a>\n",
                    i, i, 100 + i
                )
            })
            .collect();
        format!(
            "<html><body>{}<div>書き込みはこちら</div>{}<a href=\"subback.html\">一覧</a></body></html>",
            extra, threads
        )
    }

    #[test]
    fn test_http_redirect_is_resolved() {
        let page = FetchedPage::new("https://a.2ch.sc/vip/", StatusCode::MOVED_PERMANENTLY, "")
            .with_header("Location", "//b.2ch.sc/vip/");
        assert_eq!(
            classify_hop("https://a.2ch.sc/vip/", &page, ""),
            Hop::Next("https://b.2ch.sc/vip/".into())
        );
    }

    #[test]
    fn test_meta_refresh_is_followed() {
        let body = r#"<meta http-equiv="refresh" content="0;URL=https://serverz.2ch.sc/vip/">"#;
        let page = FetchedPage::new("https://a.2ch.sc/vip/", StatusCode::OK, body);
        assert_eq!(
            classify_hop("https://a.2ch.sc/vip/", &page, body),
            Hop::Next("https://serverz.2ch.sc/vip/".into())
        );
    }

    #[test]
    fn test_script_redirect_is_followed() {
        let body = "<script>window.location.href = '/moved/vip/';</script>";
        let page = FetchedPage::new("https://a.2ch.sc/vip/", StatusCode::OK, body);
        assert_eq!(
            classify_hop("https://a.2ch.sc/vip/", &page, body),
            Hop::Next("https://a.2ch.sc/moved/vip/".into())
        );
    }

    #[test]
    fn test_onclick_location_is_not_a_redirect() {
        let body = r#"<a onclick="location.href='/x/'">x</a>"#;
        let page = FetchedPage::new("https://a.2ch.sc/vip/", StatusCode::OK, body);
        assert_eq!(classify_hop("https://a.2ch.sc/vip/", &page, body), Hop::Terminal);
    }

    #[test]
    fn test_valid_board_page() {
        let rules = PageValidationRules::default();
        assert!(is_valid_board_page(&board_page(""), &rules));
    }

    #[test]
    fn test_short_page_is_rejected() {
        let rules = PageValidationRules::default();
        assert!(!is_valid_board_page("<html>read.cgi subback.html</html>", &rules));
    }

    #[test]
    fn test_denied_phrase_is_rejected() {
        let rules = PageValidationRules::default();
        assert!(!is_valid_board_page(&board_page("<h1>403 Forbidden</h1>"), &rules));
        assert!(!is_valid_board_page(&board_page("<p>該当する板は存在しません</p>"), &rules));
    }

    #[test]
    fn test_error_text_is_rejected_but_script_errors_are_not() {
        let rules = PageValidationRules::default();
        assert!(!is_valid_board_page(&board_page("<p>Error: board moved</p>"), &rules));
        assert!(is_valid_board_page(
            &board_page(r#"<img src="t.png" onerror="this.style.display='none'">"#),
            &rules
        ));
        assert!(is_valid_board_page(
            &board_page("<script>function f(){ throw new Error('x'); }</script>"),
            &rules
        ));
    }

    #[test]
    fn test_script_artifact_predicate() {
        let html = "<img onerror=\"x\"> console.error('y') plain error";
        let hits: Vec<bool> = html
            .match_indices("error")
            .map(|(i, _)| error_mention_is_script_artifact(html, i))
            .collect();
        assert_eq!(hits, vec![true, true, false]);
    }

    #[test]
    fn test_script_artifact_predicate_tolerates_any_index() {
        let html = "掲示板 error";
        for idx in 0..=html.len() + 3 {
            error_mention_is_script_artifact(html, idx);
        }
        assert!(!error_mention_is_script_artifact(html, 1));
    }

    #[test]
    fn test_not_enough_markers() {
        let rules = PageValidationRules::default();
        let body = format!("<html><body>{}<p>read.cgi</p></body></html>", "x".repeat(2000));
        assert!(!is_valid_board_page(&body, &rules));
    }
}
