//! HTML parser for harvesting references from a page
//!
//! This module handles parsing HTML content to extract:
//! - Links to follow (from <a> tags and canonical links)
//! - Image references (from <img> tags)
//! - Page title
//!
//! Links are returned as raw hrefs; resolving and filtering them is the link
//! classifier's job, since keyword exclusion looks at the href as written.

use crate::url::is_invalid_scheme;
use scraper::{Html, Selector};
use std::collections::HashSet;

/// Attributes consulted for an image's source, in order
const IMAGE_SOURCE_ATTRS: &[&str] = &["src", "data-src", "data-original", "data-lazy-src"];

/// References harvested from one HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Navigable hrefs in document order (not yet resolved)
    pub links: Vec<String>,

    /// Image sources in document order, deduplicated
    pub images: Vec<String>,

    /// mailto:, tel: and javascript: hrefs
    pub non_navigable: Vec<String>,
}

/// Parses HTML content and harvests links and images
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - Fragment-only hrefs (same page anchors)
/// - `javascript:`, `mailto:`, `tel:`, `data:` hrefs (reported separately)
///
/// # Example
///
/// ```
/// use site_binder::crawler::parse_page;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a><img src="a.png"></body></html>"#;
/// let parsed = parse_page(html);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links, vec!["/page"]);
/// assert_eq!(parsed.images, vec!["a.png"]);
/// ```
pub fn parse_page(html: &str) -> ParsedPage {
    let document = Html::parse_document(html);
    parse_document(&document)
}

/// Harvests references from an already-parsed document
pub fn parse_document(document: &Html) -> ParsedPage {
    let mut page = ParsedPage {
        title: extract_title(document),
        ..ParsedPage::default()
    };

    collect_links(document, &mut page);
    page.images = collect_images(document);
    page
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn collect_links(document: &Html, page: &mut ParsedPage) {
    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(href) = element.value().attr("href") {
                push_href(href, page);
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                push_href(href, page);
            }
        }
    }
}

fn push_href(href: &str, page: &mut ParsedPage) {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return;
    }

    if is_invalid_scheme(href) {
        if !href.to_ascii_lowercase().starts_with("data:") {
            page.non_navigable.push(href.to_string());
        }
        return;
    }

    page.links.push(href.to_string());
}

fn collect_images(document: &Html) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();

    let Ok(img_selector) = Selector::parse("img") else {
        return images;
    };

    for element in document.select(&img_selector) {
        let attrs = element.value();
        let source = IMAGE_SOURCE_ATTRS
            .iter()
            .filter_map(|name| attrs.attr(name))
            .map(str::trim)
            .find(|value| !value.is_empty() && !value.starts_with("data:"))
            .or_else(|| attrs.attr("srcset").and_then(first_srcset_candidate));

        if let Some(src) = source {
            if seen.insert(src.to_string()) {
                images.push(src.to_string());
            }
        }
    }

    images
}

/// Returns the URL of the first candidate in a `srcset` attribute
fn first_srcset_candidate(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .find(|url| !url.is_empty() && !url.starts_with("data:"))
}
