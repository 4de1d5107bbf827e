//! HTML allow-listing for user supplied text.

use std::collections::{HashMap, HashSet};

const POST_TAGS: &[&str] = &[
    "b", "i", "em", "strong", "p", "br", "ul", "ol", "li", "code", "pre", "a",
];
const LINK_ATTRIBUTES: &[&str] = &["href", "rel", "target"];
const URL_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Removes every tag and returns plain text.
///
/// Markup-significant characters survive as literal text; callers rendering
/// the result into HTML must escape it.
pub fn strip_tags(input: &str) -> String {
    let cleaned = ammonia::Builder::empty().clean(input).to_string();
    unescape_serialized_text(&cleaned)
}

/// Sanitizes a post body against the formatting allow-list.
pub fn clean_post_body(input: &str) -> String {
    let tags: HashSet<&str> = POST_TAGS.iter().copied().collect();
    let tag_attributes: HashMap<&str, HashSet<&str>> =
        HashMap::from([("a", LINK_ATTRIBUTES.iter().copied().collect())]);
    let url_schemes: HashSet<&str> = URL_SCHEMES.iter().copied().collect();

    ammonia::Builder::default()
        .tags(tags)
        .generic_attributes(HashSet::new())
        .tag_attributes(tag_attributes)
        .url_schemes(url_schemes)
        .link_rel(None)
        .clean(input)
        .to_string()
}

// The html5ever serializer only escapes these four in text nodes.
fn unescape_serialized_text(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_tags_keeps_text_only() {
        assert_eq!(strip_tags("<b>Hello</b> <i>world</i>"), "Hello world");
        assert_eq!(strip_tags("Tom & Jerry"), "Tom & Jerry");
        assert_eq!(strip_tags("a &lt; b"), "a < b");
        assert!(!strip_tags("<script>alert(1)</script>").contains('<'));
        assert_eq!(strip_tags("<img src=x onerror=alert(1)>"), "");
    }

    #[test]
    fn clean_post_body_keeps_allowed_markup() {
        let out = clean_post_body(
            r#"<p>Hi <strong>there</strong><br><a href="https://example.com" rel="noreferrer" target="_blank">link</a></p>"#,
        );
        assert!(out.contains("<strong>there</strong>"));
        assert!(out.contains(r#"href="https://example.com""#));
        assert!(out.contains(r#"rel="noreferrer""#));
        assert!(out.contains(r#"target="_blank""#));
    }

    #[test]
    fn clean_post_body_drops_scripts_handlers_and_bad_schemes() {
        let out = clean_post_body(
            r#"<p onclick="x()">ok</p><script>alert(1)</script><a href="javascript:alert(1)">x</a><h1>big</h1>"#,
        );
        assert!(!out.contains("onclick"));
        assert!(!out.contains("<script"));
        assert!(!out.contains("alert(1)"));
        assert!(!out.contains("javascript:"));
        assert!(!out.contains("<h1>"));
        assert!(out.contains("big"));
    }

    #[test]
    fn clean_post_body_allows_relative_links() {
        let out = clean_post_body(r#"<a href="/books/x/page_1.html">p1</a>"#);
        assert!(out.contains(r#"href="/books/x/page_1.html""#));
    }
}
