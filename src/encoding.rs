//! Byte-to-text decoding for fetched pages.
//!
//! Board servers still serve Shift_JIS; some index mirrors serve UTF-8.
//! Everything downstream of a fetch works on decoded `String`s produced here.

use std::sync::LazyLock;

use encoding_rs::{Encoding, SHIFT_JIS};
use regex::bytes::Regex;

/// Fraction of replacement characters tolerated before a body is rejected.
const MAX_REPLACEMENT_RATIO: f64 = 0.01;

/// How far into the body to look for a `<meta charset>` declaration.
const META_SNIFF_BYTES: usize = 2048;

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([A-Za-z0-9_\-]+)"#).unwrap()
});

#[derive(Debug, thiserror::Error)]
#[error("body is not valid {encoding}: {replaced} of {total} characters unreadable")]
pub struct EncodingError {
    pub encoding: &'static str,
    pub replaced: usize,
    pub total: usize,
}

/// Pick the encoding for a body: header charset, then meta charset, then Shift_JIS.
pub fn detect_encoding(body: &[u8], content_type: Option<&str>) -> &'static Encoding {
    content_type
        .and_then(charset_from_content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| {
            let head = &body[..body.len().min(META_SNIFF_BYTES)];
            META_CHARSET
                .captures(head)
                .and_then(|caps| caps.get(1))
                .and_then(|m| Encoding::for_label(m.as_bytes()))
        })
        .unwrap_or(SHIFT_JIS)
}

fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}

/// Decode a fetched body into text.
///
/// A body that only decodes into a mess of replacement characters is an
/// error; the caller treats that source as unusable.
pub fn decode_body(body: &[u8], content_type: Option<&str>) -> Result<String, EncodingError> {
    let encoding = detect_encoding(body, content_type);
    let (text, actual, had_errors) = encoding.decode(body);

    if had_errors {
        let total = text.chars().count();
        let replaced = text.chars().filter(|&c| c == '\u{FFFD}').count();
        if total == 0 || replaced as f64 / total as f64 > MAX_REPLACEMENT_RATIO {
            return Err(EncodingError {
                encoding: actual.name(),
                replaced,
                total,
            });
        }
    }

    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sjis(text: &str) -> Vec<u8> {
        SHIFT_JIS.encode(text).0.into_owned()
    }

    #[test]
    fn test_defaults_to_shift_jis() {
        let body = sjis("<html><body>名無しさん</body></html>");
        assert_eq!(
            decode_body(&body, None).unwrap(),
            "<html><body>名無しさん</body></html>"
        );
    }

    #[test]
    fn test_header_charset_wins() {
        let body = "<p>スレッド一覧</p>".as_bytes();
        let text = decode_body(body, Some("text/html; charset=UTF-8")).unwrap();
        assert_eq!(text, "<p>スレッド一覧</p>");
    }

    #[test]
    fn test_meta_charset_is_sniffed() {
        let body = r#"<html><head><meta charset="utf-8"></head><body>板一覧</body></html>"#;
        assert_eq!(detect_encoding(body.as_bytes(), None).name(), "UTF-8");
        assert!(decode_body(body.as_bytes(), Some("text/html")).is_ok());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let body: Vec<u8> = std::iter::repeat([0x81u8, 0x20]).take(64).flatten().collect();
        assert!(decode_body(&body, None).is_err());
    }

    #[test]
    fn test_charset_from_content_type_quoted() {
        assert_eq!(
            charset_from_content_type(r#"text/html; charset="Shift_JIS""#),
            Some("Shift_JIS")
        );
        assert_eq!(charset_from_content_type("text/html"), None);
    }
}
