//! Readable-text extraction from fetched page markup

use crate::text::collapse_whitespace;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashSet;

/// Subtrees never contributing text
const EXCLUDED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "header", "footer", "aside",
];

const MAIN_SELECTORS: &[&str] = &[
    "main",
    "[role=\"main\"]",
    ".main-content",
    ".content",
    ".article-content",
    ".post-content",
    ".entry-content",
    "#content",
    "#main",
    ".main",
];

const ARTICLE_SELECTORS: &[&str] = &["article", ".article", ".post", ".entry", ".story", ".blog-post"];

const CONTENT_SELECTORS: &[&str] = &[
    ".text-content",
    ".body-content",
    ".page-content",
    ".story-content",
    ".post-body",
    ".entry-body",
];

const PARAGRAPH_SKIP: &[&str] = &["cookie", "privacy", "terms", "advertisement", "subscribe", "newsletter"];

const BLOCK_SKIP: &[&str] = &[
    "menu", "navigation", "sidebar", "footer", "header", "cookie", "privacy", "advertisement",
];

const SENTENCE_SKIP: &[&str] = &[
    "cookie", "privacy", "terms", "advertisement", "subscribe", "newsletter", "click here", "read more",
];

const MAIN_MIN_CHARS: usize = 300;
const PARAGRAPH_MIN_CHARS: usize = 80;
const MAX_PARAGRAPHS: usize = 10;
const BLOCK_MIN_CHARS: usize = 400;
const BLOCK_MAX_DESCENDANTS: usize = 15;
const CONTAINER_MIN_CHARS: usize = 200;
/// Cascade output shorter than this falls back to whole-body text
const CASCADE_MIN_CHARS: usize = 150;
const SENTENCE_MIN_CHARS: usize = 20;
const CLEAN_SENTENCE_MIN_CHARS: usize = 30;
/// Cleaned text shorter than this is discarded
pub const MIN_EXTRACTED_CHARS: usize = 100;
const FINGERPRINT_CHARS: usize = 50;

lazy_static! {
    static ref MAIN: Vec<Selector> = parse_all(MAIN_SELECTORS);
    static ref ARTICLE: Vec<Selector> = parse_all(ARTICLE_SELECTORS);
    static ref CONTAINERS: Vec<Selector> = parse_all(CONTENT_SELECTORS);
    static ref PARAGRAPH: Selector = Selector::parse("p").unwrap();
    static ref DIV: Selector = Selector::parse("div").unwrap();
    static ref BODY: Selector = Selector::parse("body").unwrap();

    /// Boilerplate phrases removed from extracted text
    static ref BOILERPLATE: Vec<Regex> = [
        r"(?i)\b(privacy policy|terms of service|terms of use|cookie policy|accept (all )?cookies)\b",
        r"(?i)\b(subscribe to our newsletter|sign up for our newsletter|sign up|log in|sign in)\b",
        r"(?i)\b(follow us on \w+|share this( article| page)?|like us on facebook)\b",
        r"(?i)(©|\bcopyright\b)[^.]*|\ball rights reserved\b|\bpowered by \w+",
        r"(?i)\bloading\.\.\.|\bplease wait\.\.\.",
        r"(?i)javascript:\S*|function\s*\([^)]*\)|console\.log\([^)]*\)",
        r"\[[^\]]{0,80}\]",
        r"\{[^}]{0,200}\}",
        r"(?i)\b(click here|read more|learn more|find out more|skip to (main )?content)\b",
        r"(?i)\b(free trial|get started|download (the|our) app|stay updated)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();
}

fn parse_all(selectors: &[&str]) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    let lower = text.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

/// Text of an element, skipping excluded subtrees
pub fn visible_text(element: ElementRef<'_>) -> String {
    let mut pieces = Vec::new();
    collect_text(element, &mut pieces);
    collapse_whitespace(&pieces.join(" "))
}

fn collect_text<'a>(element: ElementRef<'a>, out: &mut Vec<&'a str>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push(&**text),
            Node::Element(el) if EXCLUDED_TAGS.contains(&el.name()) => {}
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                }
            }
            _ => {}
        }
    }
}

fn selector_texts(document: &Html, selectors: &[Selector], min_chars: usize, out: &mut Vec<String>) {
    for selector in selectors {
        for element in document.select(selector) {
            if in_excluded_subtree(element) {
                continue;
            }
            let text = visible_text(element);
            if char_len(&text) > min_chars {
                out.push(text);
            }
        }
    }
}

fn in_excluded_subtree(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| EXCLUDED_TAGS.contains(&a.value().name()))
}

/// Run the selector cascade: main containers, article containers, paragraph
/// aggregation, compact text blocks, then named content containers.
fn cascade(document: &Html) -> Vec<String> {
    let mut parts = Vec::new();

    selector_texts(document, &MAIN, MAIN_MIN_CHARS, &mut parts);
    selector_texts(document, &ARTICLE, MAIN_MIN_CHARS, &mut parts);

    let mut paragraphs: Vec<String> = document
        .select(&PARAGRAPH)
        .filter(|p| !in_excluded_subtree(*p))
        .map(visible_text)
        .filter(|t| char_len(t) > PARAGRAPH_MIN_CHARS && !contains_any(t, PARAGRAPH_SKIP))
        .collect();
    if !paragraphs.is_empty() {
        paragraphs.sort_by_key(|p| std::cmp::Reverse(char_len(p)));
        paragraphs.truncate(MAX_PARAGRAPHS);
        parts.push(paragraphs.join(" "));
    }

    for div in document.select(&DIV) {
        if in_excluded_subtree(div) {
            continue;
        }
        let descendants = div
            .descendants()
            .skip(1)
            .filter(|n| n.value().is_element())
            .count();
        if descendants > BLOCK_MAX_DESCENDANTS {
            continue;
        }
        let text = visible_text(div);
        if char_len(&text) > BLOCK_MIN_CHARS && !contains_any(&text, BLOCK_SKIP) {
            parts.push(text);
        }
    }

    selector_texts(document, &CONTAINERS, CONTAINER_MIN_CHARS, &mut parts);
    parts
}

/// Drop near-duplicate sentences, keyed on a lower-cased, space-free prefix
pub fn remove_duplicate_sentences(text: &str) -> String {
    let mut seen = HashSet::new();
    text.split(". ")
        .map(str::trim)
        .filter(|s| char_len(s) > SENTENCE_MIN_CHARS)
        .filter(|s| {
            let fingerprint: String = s
                .to_lowercase()
                .chars()
                .filter(|c| *c != ' ')
                .take(FINGERPRINT_CHARS)
                .collect();
            seen.insert(fingerprint)
        })
        .collect::<Vec<_>>()
        .join(". ")
}

/// Strip boilerplate phrases and short or promotional sentences
pub fn clean_content(text: &str) -> String {
    let mut content = collapse_whitespace(text);
    for pattern in BOILERPLATE.iter() {
        content = pattern.replace_all(&content, "").into_owned();
    }

    let kept: Vec<&str> = content
        .split(". ")
        .map(str::trim)
        .filter(|s| char_len(s) > CLEAN_SENTENCE_MIN_CHARS && !contains_any(s, SENTENCE_SKIP))
        .collect();

    collapse_whitespace(&kept.join(". "))
}

/// Reduce page markup to readable text; empty when nothing substantial remains
pub fn extract_readable_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let parts = cascade(&document);
    let mut content = if parts.is_empty() {
        String::new()
    } else {
        remove_duplicate_sentences(&parts.join(" "))
    };

    if char_len(content.trim()) < CASCADE_MIN_CHARS {
        tracing::debug!("Selector cascade yielded {} chars, using body text", char_len(&content));
        content = document
            .select(&BODY)
            .next()
            .map(visible_text)
            .unwrap_or_else(|| visible_text(document.root_element()));
    }

    let cleaned = clean_content(&content);
    if char_len(&cleaned) < MIN_EXTRACTED_CHARS {
        return String::new();
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(topic: &str, n: usize) -> String {
        format!(
            "{} detail number {} shows that electric cars convert stored battery energy into motion efficiently",
            topic, n
        )
    }

    fn article_page() -> String {
        let body: Vec<String> = (0..6).map(|i| sentence("drivetrain", i)).collect();
        format!(
            r#"<html><head><style>.x {{ color: red }}</style><script>var tracking = 1;</script></head>
            <body>
              <nav>Home About Contact Menu Navigation links everywhere for the site</nav>
              <header>Site header with a logo</header>
              <main><p>{}.</p></main>
              <footer>Copyright 2024 Example Corp. All rights reserved.</footer>
            </body></html>"#,
            body.join(". ")
        )
    }

    #[test]
    fn test_extracts_main_content_without_chrome() {
        let text = extract_readable_text(&article_page());
        assert!(text.contains("electric cars convert stored battery energy"));
        assert!(!text.contains("tracking"));
        assert!(!text.contains("Site header"));
        assert!(!text.contains("Navigation links"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn test_duplicate_sentences_removed() {
        let s = sentence("duplicate", 1);
        let text = remove_duplicate_sentences(&format!("{s}. {s}. short. {}", sentence("other", 2)));
        assert_eq!(text.matches("duplicate detail").count(), 1);
        assert!(text.contains("other detail"));
        assert!(!text.contains("short"));
    }

    #[test]
    fn test_falls_back_to_body_text() {
        let body: Vec<String> = (0..3).map(|i| sentence("fallback", i)).collect();
        let html = format!("<html><body><span>{}</span></body></html>", body.join(". "));
        let text = extract_readable_text(&html);
        assert!(text.contains("fallback detail number 0"));
    }

    #[test]
    fn test_tiny_page_yields_nothing() {
        assert_eq!(extract_readable_text("<html><body><p>Hi there</p></body></html>"), "");
        assert_eq!(extract_readable_text(""), "");
    }

    #[test]
    fn test_clean_content_strips_boilerplate() {
        let text = clean_content(
            "Heat pumps move heat rather than generating it directly [1] which is efficient. \
             Click here to subscribe to our newsletter for updates today. \
             They work well in moderate climates and save money over time",
        );
        assert!(text.contains("Heat pumps move heat"));
        assert!(!text.contains("[1]"));
        assert!(!text.to_lowercase().contains("newsletter"));
        assert!(text.contains("moderate climates"));
    }
}
