//! Link and image extraction from fetched pages
//!
//! Parsing happens synchronously on the raw body. Images are collected from
//! three places: `img` tags, `url(...)` references in inline styles and style
//! blocks, and anchors whose target looks like an image file.

use crate::fetcher::PageDocument;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::trace;
use url::Url;

fn image_extension_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"(?i)\.(png|jpe?g|gif|bmp)(\?.*)?$").unwrap()
    })
}

fn css_url_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r#"url\(['"]?([^'")]+)['"]?\)"#).unwrap())
}

/// True when the URL's path names an image file
pub fn looks_like_image(url: &str) -> bool {
    image_extension_re().is_match(url)
}

/// Extracts everything the crawl cares about from a fetched page
///
/// Returns the set of followable links and the set of image URLs. This is the
/// only place the DOM is materialized; the parsed tree never leaves this
/// function.
pub fn extract_content(doc: &PageDocument) -> (HashSet<String>, HashSet<String>) {
    let html = Html::parse_document(&doc.body);

    let links = extract_links(&html, &doc.url);
    let mut images = extract_images(&html, &doc.url);
    images.extend(extract_css_images(&html, &doc.url));
    images.extend(extract_anchor_images(&html, &doc.url));

    trace!(url = %doc.url, links = links.len(), images = images.len(), "Extracted page content");
    (links, images)
}

/// Collects followable links from anchor tags
///
/// Relative links are resolved against the page URL. Non-navigable schemes
/// and direct links to image files are excluded; the latter are picked up by
/// the image extraction instead.
pub fn extract_links(html: &Html, base: &Url) -> HashSet<String> {
    let mut links = HashSet::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in html.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                let href = href.trim();
                if href.is_empty()
                    || href.starts_with('#')
                    || href.starts_with("javascript:")
                    || href.starts_with("mailto:")
                    || href.starts_with("tel:")
                    || href.starts_with("data:")
                {
                    continue;
                }
                if looks_like_image(href) {
                    continue;
                }
                if let Ok(resolved) = base.join(href) {
                    links.insert(resolved.to_string());
                }
            }
        }
    }

    links
}

/// Collects image URLs from `img` tags
///
/// Data URIs are kept verbatim; everything else is resolved against the page
/// URL.
pub fn extract_images(html: &Html, base: &Url) -> HashSet<String> {
    let mut images = HashSet::new();

    if let Ok(selector) = Selector::parse("img[src]") {
        for element in html.select(&selector) {
            if let Some(src) = element.value().attr("src") {
                let src = src.trim();
                if src.is_empty() {
                    continue;
                }
                if src.starts_with("data:") {
                    images.insert(src.to_string());
                } else if let Ok(resolved) = base.join(src) {
                    images.insert(resolved.to_string());
                }
            }
        }
    }

    images
}

/// Collects image URLs referenced from CSS
///
/// Scans `url(...)` expressions in both inline `style` attributes and
/// `<style>` blocks.
pub fn extract_css_images(html: &Html, base: &Url) -> HashSet<String> {
    let mut images = HashSet::new();

    if let Ok(selector) = Selector::parse("[style]") {
        for element in html.select(&selector) {
            if let Some(style) = element.value().attr("style") {
                collect_css_urls(style, base, &mut images);
            }
        }
    }

    if let Ok(selector) = Selector::parse("style") {
        for element in html.select(&selector) {
            let css: String = element.text().collect();
            collect_css_urls(&css, base, &mut images);
        }
    }

    images
}

/// Collects anchors whose target names an image file
pub fn extract_anchor_images(html: &Html, base: &Url) -> HashSet<String> {
    let mut images = HashSet::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in html.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                let href = href.trim();
                if looks_like_image(href) {
                    if let Ok(resolved) = base.join(href) {
                        images.insert(resolved.to_string());
                    }
                }
            }
        }
    }

    images
}

fn collect_css_urls(css: &str, base: &Url, out: &mut HashSet<String>) {
    for capture in css_url_re().captures_iter(css) {
        let reference = capture[1].trim();
        if reference.is_empty() {
            continue;
        }
        if reference.starts_with("data:") {
            out.insert(reference.to_string());
        } else if let Ok(resolved) = base.join(reference) {
            out.insert(resolved.to_string());
        }
    }
}
