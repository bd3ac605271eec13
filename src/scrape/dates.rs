//! Post date parsing.
//!
//! Board timestamps are Japan local time. Formats seen in the wild:
//! - `2024/01/15(月) 12:34:56.78`
//! - `24/01/15(Mon) 12:34`
//! - `2024-01-15 12:34:56`, `2024-01-15T12:34:56` and `24-01-15 12:34`
//! - `2024-01-15` (midnight)
//! - `今日 12:34`, `昨日 23:01`
//!
//! Unusable text falls back to the extraction time, so a post is never
//! dropped for its date.

use std::sync::LazyLock;

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use regex::Regex;

/// Offset of Japan Standard Time from UTC, in seconds.
const JST_OFFSET_SECS: i32 = 9 * 60 * 60;

/// Two-digit years below this are 20xx, the rest 19xx.
const TWO_DIGIT_YEAR_CUTOFF: u32 = 50;

static WEEKDAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[(（][^)）]{1,4}[)）]\s*").unwrap());

static FRACTIONAL_SECONDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2}:\d{2}:\d{2})\.\d+").unwrap());

static TWO_DIGIT_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2})([/-]\d{1,2}[/-])").unwrap());

static RELATIVE_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(今日|昨日|today|yesterday)\s*(\d{1,2}:\d{2}(?::\d{2})?)?$").unwrap()
});

/// Patterns that locate date text inside larger strings, most specific first.
pub(crate) static DATE_TEXT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // 2024/01/15(月) 12:34:56.78
        Regex::new(
            r"\d{4}/\d{1,2}/\d{1,2}(?:\s*[(（][^)）]{1,4}[)）])?\s*\d{1,2}:\d{2}(?::\d{2}(?:\.\d+)?)?",
        )
        .unwrap(),
        // 2024-01-15 12:34:56 or 2024-01-15T12:34:56
        Regex::new(r"\d{4}-\d{1,2}-\d{1,2}(?:[ T]\d{1,2}:\d{2}(?::\d{2}(?:\.\d+)?)?)?").unwrap(),
        // 24/01/15(月) 12:34
        Regex::new(
            r"\d{2}/\d{1,2}/\d{1,2}(?:\s*[(（][^)）]{1,4}[)）])?\s*\d{1,2}:\d{2}(?::\d{2}(?:\.\d+)?)?",
        )
        .unwrap(),
        // 24-01-15 12:34:56
        Regex::new(r"\b\d{2}-\d{1,2}-\d{1,2}[ T]\d{1,2}:\d{2}(?::\d{2}(?:\.\d+)?)?").unwrap(),
        // 今日 12:34
        Regex::new(r"(?i)(?:今日|昨日|today|yesterday)\s*\d{1,2}:\d{2}(?::\d{2})?").unwrap(),
    ]
});

/// Absolute formats tried in order after normalization.
const FORMATS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Date-only formats, read as midnight.
const DATE_ONLY_FORMATS: &[&str] = &["%Y/%m/%d", "%Y-%m-%d"];

/// Japan Standard Time.
pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(JST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Current time in JST.
pub fn now_jst() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&jst())
}

/// Find the first date-looking substring in `text`.
pub fn find_date_text(text: &str) -> Option<&str> {
    DATE_TEXT_PATTERNS
        .iter()
        .find_map(|re| re.find(text))
        .map(|m| m.as_str())
}

/// Parse board date text, falling back to `now`.
pub fn parse_post_date(raw: &str, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    try_parse_post_date(raw, now).unwrap_or(now)
}

/// Parse board date text. `now` anchors relative forms like `今日`.
pub fn try_parse_post_date(
    raw: &str,
    now: DateTime<FixedOffset>,
) -> Option<DateTime<FixedOffset>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt);
    }

    let normalized = normalize(trimmed);
    if let Some(dt) = parse_relative(&normalized, now) {
        return Some(dt);
    }

    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
        .or_else(|| {
            DATE_ONLY_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(&normalized, fmt).ok())
                .map(|date| date.and_time(NaiveTime::MIN))
        })
        .and_then(|naive| jst().from_local_datetime(&naive).single())
}

fn normalize(raw: &str) -> String {
    let without_weekday = WEEKDAY.replace_all(raw, " ");
    let without_fraction = FRACTIONAL_SECONDS.replace_all(&without_weekday, "$1");
    let collapsed = without_fraction.split_whitespace().collect::<Vec<_>>().join(" ");
    expand_two_digit_year(&collapsed)
}

fn expand_two_digit_year(text: &str) -> String {
    TWO_DIGIT_YEAR
        .replace(text, |caps: &regex::Captures| {
            let year: u32 = caps[1].parse().unwrap_or(0);
            let century = if year < TWO_DIGIT_YEAR_CUTOFF { 2000 } else { 1900 };
            format!("{}{}", century + year, &caps[2])
        })
        .into_owned()
}

fn parse_relative(text: &str, now: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    let caps = RELATIVE_DAY.captures(text)?;
    let day = caps[1].to_lowercase();
    let date = if day == "昨日" || day == "yesterday" {
        now - Duration::days(1)
    } else {
        now
    };

    let time = match caps.get(2) {
        Some(m) => NaiveTime::parse_from_str(m.as_str(), "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(m.as_str(), "%H:%M"))
            .ok()?,
        None => now.time(),
    };

    let naive = date.date_naive().and_time(time);
    now.timezone().from_local_datetime(&naive).single()
}
