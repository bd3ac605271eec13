//! Post body cleanup.

use std::sync::LazyLock;

use regex::Regex;

/// Leading quote marker on a line (`>` or `>>`), with surrounding blanks.
static LEADING_QUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t\u{3000}]*>{1,2}[ \t]*").unwrap());

/// Normalize extracted post text.
///
/// Decodes HTML entities, strips quote markers at the start of lines,
/// trims each line and collapses runs of blank lines. Markers in the middle
/// of a line (`see >>12`) are left alone.
pub fn clean_content(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw);

    let mut lines: Vec<String> = Vec::new();
    let mut previous_blank = true;
    for line in decoded.lines() {
        let line = LEADING_QUOTE.replace(line, "");
        let line = line.trim();
        if line.is_empty() {
            if !previous_blank {
                lines.push(String::new());
            }
            previous_blank = true;
        } else {
            lines.push(line.to_string());
            previous_blank = false;
        }
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_markers_only_at_line_start() {
        assert_eq!(clean_content(">>12 わかる"), "12 わかる");
        assert_eq!(clean_content("> quoted\nreply to >>3"), "quoted\nreply to >>3");
    }

    #[test]
    fn test_entities_are_decoded() {
        assert_eq!(clean_content("a &amp; b &lt;3"), "a & b <3");
        assert_eq!(clean_content("&gt;&gt;5 ok"), "5 ok");
    }

    #[test]
    fn test_blank_lines_collapse() {
        assert_eq!(
            clean_content("\n\n first  \n\n\n\n second \n\n"),
            "first\n\nsecond"
        );
    }
}
