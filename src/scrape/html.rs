//! Small DOM helpers shared by the index and thread parsers.

use scraper::{ElementRef, Node, Selector};

/// Parse a selector list, skipping entries that fail to parse.
pub(crate) fn selectors(sources: &[&str]) -> Vec<Selector> {
    sources
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
}

/// Element text with `<br>` turned into newlines.
pub(crate) fn text_with_breaks(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(text) => {
                let skip = node
                    .parent()
                    .and_then(ElementRef::wrap)
                    .is_some_and(|p| matches!(p.value().name(), "script" | "style"));
                if !skip {
                    out.push_str(text);
                }
            }
            Node::Element(el) if el.name() == "br" => out.push('\n'),
            _ => {}
        }
    }
    out
}

/// Element text with runs of whitespace collapsed to single spaces.
pub(crate) fn flat_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Closest preceding sibling element of a different tag (e.g. the `dt`
/// before a `dd`). Siblings of the same tag are other posts, not headers.
pub(crate) fn header_sibling(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let sibling = element.prev_siblings().find_map(ElementRef::wrap)?;
    (sibling.value().name() != element.value().name()).then_some(sibling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_text_with_breaks() {
        let doc = Html::parse_fragment("<dd> first<br>second<script>x()</script><br/>third</dd>");
        let dd = doc.select(&Selector::parse("dd").unwrap()).next().unwrap();
        assert_eq!(text_with_breaks(dd), " first\nsecond\nthird");
    }

    #[test]
    fn test_header_sibling_skips_same_tag() {
        let doc = Html::parse_fragment("<dl><dt>head</dt><dd>body</dd></dl><div>a</div><div>b</div>");
        let dd = doc.select(&Selector::parse("dd").unwrap()).next().unwrap();
        assert_eq!(flat_text(header_sibling(dd).unwrap()), "head");

        let second = doc.select(&Selector::parse("div").unwrap()).nth(1).unwrap();
        assert!(header_sibling(second).is_none());
    }
}
