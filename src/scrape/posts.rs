//! Thread page post extraction.
//!
//! Thread pages come in several layouts (modern `div.post`, classic
//! `<dl><dt><dd>`, bare `data-number` blocks) and the same thread can be
//! served under several URL forms, each returning more or fewer posts.
//! Layouts are tried in order and the first that matches wins; URL
//! variants are tried in order and the largest result wins.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use super::content::clean_content;
use super::dates::{find_date_text, now_jst, parse_post_date};
use super::html::{flat_text, header_sibling, selectors, text_with_breaks};
use super::ScrapedPost;
use crate::config::ScraperSettings;
use crate::encoding::decode_body;
use crate::http_client::{fetch_success, FetchRequest, PageFetcher};

/// Author shown when a post carries no name.
pub const ANONYMOUS_AUTHOR: &str = "名無しさん";

static THREAD_BASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?/read\.(?:cgi|so)/[^/]+/\d+)(?:/.*)?$").unwrap());

static ANONYMIZED_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ID[:：]\s*([A-Za-z0-9+/.]{8,})").unwrap());

static TRAILING_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)$").unwrap());

static AUTHOR_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[".name", ".postername", ".username", r#"[class*="name"]"#])
});

static HEADER_AUTHOR_SELECTORS: LazyLock<Vec<Selector>> =
    LazyLock::new(|| selectors(&[".name", "b"]));

static DATE_SELECTORS: LazyLock<Vec<Selector>> =
    LazyLock::new(|| selectors(&[".date", "time", r#"[class*="date"]"#]));

static DATE_ATTRIBUTE_CARRIERS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[data-date], [datetime]").unwrap());

static MESSAGE_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[".message", ".escaped", ".msg", ".body", r#"[class*="message"]"#])
});

/// Attributes that may carry the post number, in order.
const SEQUENCE_ATTRIBUTES: &[&str] = &["data-number", "data-res", "data-id", "id"];

/// Post container layouts, tried in order.
static LAYOUTS: LazyLock<Vec<(&'static str, Selector)>> = LazyLock::new(|| {
    [
        ("post-container", "div.post, article.post, div.res, li.post"),
        ("definition-list", "dl > dd"),
        ("numbered-data", "[data-number], [data-res]"),
    ]
    .into_iter()
    .filter_map(|(name, css)| Selector::parse(css).ok().map(|s| (name, s)))
    .collect()
});

/// URL forms to try for a thread, in order, without duplicates.
///
/// The board software serves the same thread under the bare base URL, an
/// explicit full range and a from-zero range.
pub fn url_variants(thread_url: &str) -> Vec<String> {
    let Some(caps) = THREAD_BASE.captures(thread_url.trim()) else {
        return vec![thread_url.to_string()];
    };
    let base = format!("{}/", &caps[1]);

    let mut variants = Vec::new();
    for candidate in [
        base.clone(),
        format!("{}1-1000", base),
        format!("{}0-", base),
        thread_url.to_string(),
    ] {
        if !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }
    variants
}

/// Post containers for the first layout that matches anything.
fn post_containers(document: &Html) -> Vec<ElementRef<'_>> {
    for (name, selector) in LAYOUTS.iter() {
        let found: Vec<_> = document.select(selector).collect();
        if !found.is_empty() {
            debug!("Using {} layout ({} containers)", name, found.len());
            return found;
        }
    }
    Vec::new()
}

fn sequence_number(container: ElementRef<'_>, position: usize) -> u32 {
    SEQUENCE_ATTRIBUTES
        .iter()
        .filter_map(|attr| container.value().attr(attr))
        .filter_map(|value| TRAILING_NUMBER.captures(value.trim()))
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .find(|&n| n > 0)
        .unwrap_or_else(|| u32::try_from(position + 1).unwrap_or(u32::MAX))
}

fn first_text(element: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .filter_map(|s| element.select(s).next())
        .map(flat_text)
        .find(|t| !t.is_empty())
}

fn author(container: ElementRef<'_>) -> String {
    first_text(container, &AUTHOR_SELECTORS)
        .or_else(|| {
            header_sibling(container).and_then(|h| first_text(h, &HEADER_AUTHOR_SELECTORS))
        })
        .unwrap_or_else(|| ANONYMOUS_AUTHOR.to_string())
}

fn anonymized_id(container: ElementRef<'_>) -> Option<String> {
    let find = |el: ElementRef<'_>| {
        ANONYMIZED_ID
            .captures(&flat_text(el))
            .map(|caps| caps[1].to_string())
    };
    find(container).or_else(|| header_sibling(container).and_then(find))
}

fn raw_date(container: ElementRef<'_>) -> Option<String> {
    let from_elements = DATE_SELECTORS
        .iter()
        .filter_map(|s| container.select(s).next())
        .map(flat_text)
        .find_map(|t| find_date_text(&t).map(str::to_string));
    if from_elements.is_some() {
        return from_elements;
    }

    let from_attributes = std::iter::once(container)
        .chain(container.select(&DATE_ATTRIBUTE_CARRIERS))
        .flat_map(|el| ["data-date", "datetime"].map(|a| el.value().attr(a)))
        .flatten()
        .find_map(|v| find_date_text(v).map(str::to_string));
    if from_attributes.is_some() {
        return from_attributes;
    }

    find_date_text(&flat_text(container))
        .map(str::to_string)
        .or_else(|| {
            header_sibling(container)
                .and_then(|h| find_date_text(&flat_text(h)).map(str::to_string))
        })
}

fn content(container: ElementRef<'_>, author: &str) -> String {
    let raw = MESSAGE_SELECTORS
        .iter()
        .filter_map(|s| container.select(s).next())
        .map(text_with_breaks)
        .find(|t| !t.trim().is_empty())
        .unwrap_or_else(|| {
            let text = text_with_breaks(container);
            if author != ANONYMOUS_AUTHOR {
                text.replacen(author, "", 1)
            } else {
                text
            }
        });
    clean_content(&raw)
}

/// Extract posts from one thread page.
///
/// Posts whose cleaned text is shorter than `min_content_chars` are dropped
/// as noise. Repeated sequence numbers keep their first occurrence. The
/// result is sorted by sequence number.
pub fn parse_posts(
    html: &str,
    min_content_chars: usize,
    now: DateTime<FixedOffset>,
) -> Vec<ScrapedPost> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut posts = Vec::new();

    for (position, container) in post_containers(&document).into_iter().enumerate() {
        let sequence_number = sequence_number(container, position);
        let author = author(container);
        let content = content(container, &author);
        if content.chars().count() < min_content_chars {
            continue;
        }
        if !seen.insert(sequence_number) {
            continue;
        }

        let raw_date_text = raw_date(container);
        let posted_at = raw_date_text
            .as_deref()
            .map(|raw| parse_post_date(raw, now))
            .unwrap_or(now);

        posts.push(ScrapedPost {
            sequence_number,
            author,
            content,
            posted_at,
            anonymized_id: anonymized_id(container),
            raw_date_text,
        });
    }

    posts.sort_by_key(|p| p.sequence_number);
    posts
}

/// Fetches a thread and extracts its posts, trying several URL forms.
pub struct PostExtractor {
    fetcher: Arc<dyn PageFetcher>,
    timeout: Duration,
    good_enough: usize,
    min_content_chars: usize,
}

impl PostExtractor {
    pub fn new(fetcher: Arc<dyn PageFetcher>, settings: &ScraperSettings) -> Self {
        Self {
            fetcher,
            timeout: settings.fetch_timeout(),
            good_enough: settings.good_enough_posts,
            min_content_chars: settings.min_content_chars,
        }
    }

    /// Posts for a thread, or an empty list when no URL form yields any.
    ///
    /// A variant's result replaces the current best only when strictly
    /// larger; the search stops once a result is good enough.
    pub async fn extract_posts(&self, thread_url: &str) -> Vec<ScrapedPost> {
        let mut best: Vec<ScrapedPost> = Vec::new();

        for variant in url_variants(thread_url) {
            let posts = match self.fetch_posts(&variant).await {
                Some(posts) => posts,
                None => continue,
            };
            debug!("{}: {} posts", variant, posts.len());

            if posts.len() > best.len() {
                best = posts;
            }
            if best.len() > self.good_enough {
                break;
            }
        }

        info!("Extracted {} posts from {}", best.len(), thread_url);
        best
    }

    async fn fetch_posts(&self, url: &str) -> Option<Vec<ScrapedPost>> {
        let request = FetchRequest::get(url, self.timeout);
        let page = match fetch_success(self.fetcher.as_ref(), &request).await {
            Ok(page) => page,
            Err(e) => {
                debug!("Thread variant {} failed: {}", url, e);
                return None;
            }
        };
        let html = match decode_body(&page.body, page.content_type()) {
            Ok(html) => html,
            Err(e) => {
                debug!("Thread variant {} undecodable: {}", url, e);
                return None;
            }
        };
        Some(parse_posts(&html, self.min_content_chars, now_jst()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::dates::jst;
    use chrono::TimeZone;

    fn now() -> DateTime<FixedOffset> {
        jst().with_ymd_and_hms(2024, 3, 10, 18, 0, 0).unwrap()
    }

    #[test]
    fn test_url_variants() {
        assert_eq!(
            url_variants("https://viper.2ch.sc/test/read.cgi/news4vip/1700000000/l50"),
            vec![
                "https://viper.2ch.sc/test/read.cgi/news4vip/1700000000/",
                "https://viper.2ch.sc/test/read.cgi/news4vip/1700000000/1-1000",
                "https://viper.2ch.sc/test/read.cgi/news4vip/1700000000/0-",
                "https://viper.2ch.sc/test/read.cgi/news4vip/1700000000/l50",
            ]
        );
        assert_eq!(
            url_variants("https://viper.2ch.sc/test/read.cgi/news4vip/1700000000/").len(),
            3
        );
        assert_eq!(url_variants("https://example.com/x"), vec!["https://example.com/x"]);
    }

    #[test]
    fn test_definition_list_layout() {
        let html = r#"<html><body><dl class="thread">
            <dt>1 ：<a href="mailto:sage"><b>名無しさん@実況</b></a>：2024/01/15(月) 12:34:56.78 ID:abcDEF12</dt>
            <dd> 今日の晩飯 <br> カレー </dd>
            <dt>2 ：<b>名無しさん</b>：2024/01/15(月) 12:35:00.00 ID:zyxWVU98</dt>
            <dd> &gt;&gt;1 うまそう </dd>
        </dl></body></html>"#;
        let posts = parse_posts(html, 3, now());
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].sequence_number, 1);
        assert_eq!(posts[0].author, "名無しさん@実況");
        assert_eq!(posts[0].content, "今日の晩飯\nカレー");
        assert_eq!(posts[0].anonymized_id.as_deref(), Some("abcDEF12"));
        assert_eq!(
            posts[0].raw_date_text.as_deref(),
            Some("2024/01/15(月) 12:34:56.78")
        );
        assert_eq!(
            posts[0].posted_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2024-01-15 12:34:56"
        );
        assert_eq!(posts[1].content, "1 うまそう");
    }

    #[test]
    fn test_modern_post_layout() {
        let html = r#"<div class="thread">
            <div class="post" id="3" data-date="NG">
                <div class="meta"><span class="name"><b>風吹けば名無し</b></span>
                <span class="date">2024/02/01(木) 08:00:00.12</span>
                <span class="uid">ID:Qw3rTy12</span></div>
                <div class="message"><span class="escaped">This is a real reply.</span></div>
            </div>
            <div class="post" id="1">
                <div class="message">12</div>
            </div>
            <div class="post" id="2">
                <div class="message">最初の書き込み</div>
            </div>
        </div>"#;
        let posts = parse_posts(html, 3, now());
        let numbers: Vec<u32> = posts.iter().map(|p| p.sequence_number).collect();
        assert_eq!(numbers, vec![2, 3]);
        assert_eq!(posts[1].author, "風吹けば名無し");
        assert_eq!(posts[1].content, "This is a real reply.");
        assert_eq!(posts[1].anonymized_id.as_deref(), Some("Qw3rTy12"));
        assert_eq!(posts[0].author, ANONYMOUS_AUTHOR);
        assert_eq!(posts[0].posted_at, now());
        assert!(posts[0].raw_date_text.is_none());
    }

    #[test]
    fn test_numbered_data_layout_and_duplicates() {
        let html = r#"<section>
            <p data-res="5">first copy of five</p>
            <p data-res="5">second copy of five</p>
            <p>no number here</p>
        </section>"#;
        let posts = parse_posts(html, 3, now());
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].content, "first copy of five");
    }

    #[test]
    fn test_position_numbers_when_no_attribute() {
        let html = r#"<dl><dt>a</dt><dd>alpha post</dd><dt>b</dt><dd>beta post</dd></dl>"#;
        let posts = parse_posts(html, 3, now());
        assert_eq!(posts[0].sequence_number, 1);
        assert_eq!(posts[1].sequence_number, 2);
    }

    #[test]
    fn test_no_layout_yields_nothing() {
        assert!(parse_posts("<html><p>nothing</p></html>", 3, now()).is_empty());
    }
}
