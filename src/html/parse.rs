//! Tolerant parsing of element snippets into a comparable context.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html};

use super::similarity::normalize_text;

/// Marks the target element inside a snippet that also carries its context.
///
/// `<ul><li>One</li><li data-dom-target>Two</li></ul>` targets the second
/// `li`, with `ul` as its parent and one `li` sibling. The marker itself is
/// never compared.
pub const TARGET_MARKER: &str = "data-dom-target";

/// An element together with one level of surrounding context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementContext {
    /// Lowercase tag name
    pub tag: String,
    /// Parent tag, `None` when the element sits at the top of the snippet
    pub parent_tag: Option<String>,
    /// Tags of the element's siblings, in document order
    pub sibling_tags: Vec<String>,
    /// Attributes with lowercase names, marker removed
    pub attributes: BTreeMap<String, String>,
    /// Normalized text content
    pub text: String,
    /// Tags of all nested elements, in document order
    pub descendant_tags: Vec<String>,
}

/// Parse a snippet into an [`ElementContext`].
///
/// Returns `None` for empty input or tag soup with no recoverable element.
pub fn parse_element(html: &str) -> Option<ElementContext> {
    let html = html.trim();
    if html.is_empty() {
        return None;
    }

    let fragment = Html::parse_fragment(html);
    let root = fragment.root_element();

    let target = root
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().attr(TARGET_MARKER).is_some())
        .or_else(|| root.children().filter_map(ElementRef::wrap).next())?;

    let parent_tag = target
        .parent()
        .and_then(ElementRef::wrap)
        .filter(|parent| parent.id() != root.id())
        .map(tag_name);

    let mut sibling_tags: Vec<String> = target
        .prev_siblings()
        .filter_map(ElementRef::wrap)
        .map(tag_name)
        .collect();
    sibling_tags.reverse();
    sibling_tags.extend(target.next_siblings().filter_map(ElementRef::wrap).map(tag_name));

    let attributes = target
        .value()
        .attrs()
        .filter(|(name, _)| *name != TARGET_MARKER)
        .map(|(name, value)| (name.to_lowercase(), value.to_string()))
        .collect();

    let text = normalize_text(&target.text().collect::<Vec<_>>().join(" "));

    let descendant_tags = target
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .map(tag_name)
        .collect();

    Some(ElementContext {
        tag: tag_name(target),
        parent_tag,
        sibling_tags,
        attributes,
        text,
        descendant_tags,
    })
}

fn tag_name(el: ElementRef<'_>) -> String {
    el.value().name().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_single_element() {
        let ctx = parse_element(r#"<button id="btn1" class="search-btn">Search</button>"#).unwrap();
        assert_eq!(ctx.tag, "button");
        assert_eq!(ctx.parent_tag, None);
        assert!(ctx.sibling_tags.is_empty());
        assert_eq!(ctx.attributes.get("id").map(String::as_str), Some("btn1"));
        assert_eq!(ctx.attributes.get("class").map(String::as_str), Some("search-btn"));
        assert_eq!(ctx.text, "search");
    }

    #[test]
    fn test_parse_marked_target_with_context() {
        let ctx = parse_element(
            r#"<ul><li>One</li><li data-dom-target="">Two</li><li>Three</li></ul>"#,
        )
        .unwrap();
        assert_eq!(ctx.tag, "li");
        assert_eq!(ctx.parent_tag.as_deref(), Some("ul"));
        assert_eq!(ctx.sibling_tags, vec!["li", "li"]);
        assert!(!ctx.attributes.contains_key(TARGET_MARKER));
        assert_eq!(ctx.text, "two");
    }

    #[test]
    fn test_parse_nested_markup() {
        let ctx = parse_element("<a href='/x'><span>Go</span> <b>now</b></a>").unwrap();
        assert_eq!(ctx.descendant_tags, vec!["span", "b"]);
        assert_eq!(ctx.text, "go now");
    }

    #[test]
    fn test_parse_empty_and_soup() {
        assert!(parse_element("").is_none());
        assert!(parse_element("   \n").is_none());
        assert!(parse_element("just some text").is_none());
    }

    #[test]
    fn test_parse_unclosed_tags_best_effort() {
        let ctx = parse_element("<div class='card'><p>Hello").unwrap();
        assert_eq!(ctx.tag, "div");
        assert_eq!(ctx.descendant_tags, vec!["p"]);
        assert_eq!(ctx.text, "hello");
    }
}
