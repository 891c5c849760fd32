//! Record and link extraction from fetched pages
//!
//! Kept deliberately small: richer DOM processing belongs in a custom
//! [`PageRenderer`](super::browser::PageRenderer) or
//! [`DocumentParser`](super::document::DocumentParser).

use scraper::{Html, Selector};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::OnceLock;

use super::transport::FetchedPage;
use crate::crawler::url::normalize_url;
use crate::models::OutputSchema;
use crate::utils::error::StrategyError;
use crate::utils::normalize_whitespace;

// ============================================================================
// Cached selectors
// ============================================================================

fn title_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("title").expect("valid selector"))
}

fn description_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| {
        Selector::parse(r#"meta[name="description"], meta[property="og:description"]"#)
            .expect("valid selector")
    })
}

fn heading_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("h1, h2").expect("valid selector"))
}

fn body_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("body").expect("valid selector"))
}

fn link_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("a[href]").expect("valid selector"))
}

fn script_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("script").expect("valid selector"))
}

fn element_text(element: scraper::ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

// ============================================================================
// Records
// ============================================================================

/// Extract a record from a page: JSON bodies pass through, markup is parsed
pub fn record_from_page(page: &FetchedPage, schema: Option<&OutputSchema>) -> Result<Value, StrategyError> {
    if page.is_json() {
        return serde_json::from_str(&page.text)
            .map_err(|e| StrategyError::InvalidResponse(format!("malformed JSON from {}: {e}", page.url)));
    }
    Ok(extract_record(&page.text, &page.url, schema))
}

/// Extract a record from markup
///
/// With a schema every field maps to the text of its selector matches:
/// `null` for none, a string for one, an array for several. Without a schema
/// a default record is produced.
pub fn extract_record(html: &str, url: &str, schema: Option<&OutputSchema>) -> Value {
    let document = Html::parse_document(html);

    match schema {
        Some(schema) => {
            let mut record = Map::new();
            for (field, selector) in schema {
                let value = match Selector::parse(selector) {
                    Ok(sel) => {
                        let mut texts: Vec<String> = document.select(&sel).map(element_text).collect();
                        match texts.len() {
                            0 => Value::Null,
                            1 => Value::String(texts.remove(0)),
                            _ => Value::from(texts),
                        }
                    }
                    Err(_) => Value::Null,
                };
                record.insert(field.clone(), value);
            }
            Value::Object(record)
        }
        None => default_record(&document, url),
    }
}

fn default_record(document: &Html, url: &str) -> Value {
    let title = document.select(title_selector()).next().map(element_text);
    let description = document
        .select(description_selector())
        .find_map(|m| m.value().attr("content"))
        .map(normalize_whitespace);
    let headings: Vec<String> = document
        .select(heading_selector())
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();

    json!({
        "url": url,
        "title": title,
        "description": description,
        "headings": headings,
        "text_length": visible_text(document).chars().count(),
    })
}

/// Visible body text, scripts excluded
fn visible_text(document: &Html) -> String {
    let Some(body) = document.select(body_selector()).next() else {
        return String::new();
    };
    let text: String = body
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let parent_is_code = node
                .parent()
                .and_then(|p| p.value().as_element())
                .map(|e| matches!(e.name(), "script" | "style" | "noscript"))
                .unwrap_or(false);
            (!parent_is_code).then(|| text.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ");
    normalize_whitespace(&text)
}

// ============================================================================
// Links
// ============================================================================

/// Absolute, normalized, de-duplicated outbound links in document order
pub fn extract_links(html: &str, base: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    document
        .select(link_selector())
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| normalize_url(href, base))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

// ============================================================================
// Structure probe
// ============================================================================

/// Structural signals used by `auto` resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkupSignals {
    pub script_count: usize,
    pub text_length: usize,
    pub has_app_shell: bool,
}

impl MarkupSignals {
    /// Heavy client-side rendering or empty initial markup
    pub fn needs_browser(&self) -> bool {
        self.has_app_shell
            || self.text_length == 0
            || (self.script_count >= 5 && self.text_length < 200)
    }
}

/// Inspect markup for client-side rendering markers
pub fn markup_signals(html: &str) -> MarkupSignals {
    const SHELL_MARKERS: &[&str] = &[
        r#"<div id="root"></div>"#,
        r#"<div id="app"></div>"#,
        "__NEXT_DATA__",
        "data-reactroot",
        "ng-app",
        "enable JavaScript",
    ];

    let document = Html::parse_document(html);
    MarkupSignals {
        script_count: document.select(script_selector()).count(),
        text_length: visible_text(&document).chars().count(),
        has_app_shell: SHELL_MARKERS.iter().any(|m| html.contains(m)),
    }
}
