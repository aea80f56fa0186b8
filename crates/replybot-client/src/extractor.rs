use std::sync::LazyLock;

use replybot_core::traits::LinkExtractor;
use scraper::{ElementRef, Html, Selector};

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid anchor selector"));

/// Elements that end a line in the text view.
const BLOCK_ELEMENTS: &[&str] = &["p", "div", "li", "blockquote", "h1", "h2", "h3", "h4", "h5", "h6"];

/// Link extractor over post HTML using scraper.
///
/// Mastodon marks mentions and hashtags with a `class` (and some clients
/// add inline `style`), so only bare anchors count as links a person wrote.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScraperLinkExtractor;

impl ScraperLinkExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl LinkExtractor for ScraperLinkExtractor {
    fn extract_links(&self, content: &str) -> Vec<String> {
        if !content.contains('<') {
            return Vec::new();
        }

        let fragment = Html::parse_fragment(content);
        fragment
            .select(&ANCHOR)
            .filter(|a| !has_value(a, "class") && !has_value(a, "style"))
            .filter_map(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn plain_text(&self, content: &str) -> String {
        if !content.contains('<') {
            return content.to_string();
        }

        let fragment = Html::parse_fragment(content);
        let mut out = String::with_capacity(content.len());
        push_text(fragment.root_element(), &mut out);
        out.trim_end_matches('\n').to_string()
    }
}

fn has_value(anchor: &ElementRef<'_>, attr: &str) -> bool {
    anchor
        .value()
        .attr(attr)
        .is_some_and(|v| !v.trim().is_empty())
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(el) = ElementRef::wrap(child) {
            match el.value().name() {
                "br" => out.push('\n'),
                "script" | "style" => {}
                name => {
                    push_text(el, out);
                    if BLOCK_ELEMENTS.contains(&name) && !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
}
