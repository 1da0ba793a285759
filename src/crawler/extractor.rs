//! Page extraction
//!
//! Turns one fetched gallery page into image records and the URL of the
//! next page of the same listing, if any.
//!
//! Parsing is synchronous: `scraper::Html` is not `Send`, so a document never
//! lives across an `.await`.

use crate::config::SiteProfile;
use crate::state::ImageRecord;
use crate::url::{last_path_segment, path_extension, query_param, resolve_href};
use regex::Regex;
use scraper::{ElementRef, Html};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

/// Attributes holding the image source, lazy-loading ones first
const SOURCE_ATTRIBUTES: &[&str] = &["data-src", "data-original", "data-lazy-src", "src"];

/// Attributes of a lightbox anchor holding the caption
const CAPTION_ATTRIBUTES: &[&str] = &["title", "data-title"];

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("TAG: hardcoded regex is valid"));

static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>").expect("LINE_BREAK: hardcoded regex is valid")
});

static BROKEN_DIMENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"x(\d+)\s+(\d+)").expect("BROKEN_DIMENSION: hardcoded regex is valid")
});

static DIMENSIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+(?:[.,]\d+)?\s*x\s*\d+(?:[.,]\d+)?(?:\s*cm)?)")
        .expect("DIMENSIONS: hardcoded regex is valid")
});

/// Everything extracted from one page
#[derive(Debug, Clone, Default)]
pub struct PageExtraction {
    pub page_title: String,
    /// Gallery images in document order, each URL once
    pub images: Vec<ImageRecord>,
    pub next_page_url: Option<Url>,
}

/// Extracts the gallery images and the next-page link of a page
///
/// `page_index` is the 1-based position of the page within its category;
/// a link reading `page_index + 1` is the preferred next-page link.
pub fn extract_page(
    html: &str,
    page_url: &Url,
    page_index: u32,
    profile: &SiteProfile,
) -> PageExtraction {
    let document = Html::parse_document(html);

    let page_title = document
        .select(&profile.title)
        .next()
        .map(|title| clean_text(&title.text().collect::<String>()))
        .unwrap_or_default();

    let mut seen = HashSet::new();
    let mut images = Vec::new();
    for element in document.select(&profile.images) {
        let Some(record) = extract_image(element, page_url, &page_title, profile) else {
            continue;
        };
        if seen.insert(record.original_url.clone()) {
            images.push(record);
        }
    }

    let next_page_url = find_next_page(&document, page_url, page_index, profile);

    tracing::debug!(
        "Extracted {} images from {} (next: {})",
        images.len(),
        page_url,
        next_page_url
            .as_ref()
            .map(Url::as_str)
            .unwrap_or("none")
    );

    PageExtraction {
        page_title,
        images,
        next_page_url,
    }
}

fn extract_image(
    element: ElementRef<'_>,
    page_url: &Url,
    page_title: &str,
    profile: &SiteProfile,
) -> Option<ImageRecord> {
    let source = image_source(element, page_url)?;

    let matches_pattern = match &profile.image_url_pattern {
        Some(pattern) => {
            if !pattern.is_match(source.as_str()) {
                return None;
            }
            true
        }
        None => false,
    };

    if let Some(extension) = path_extension(&source) {
        if !profile.is_supported_extension(&extension) {
            return None;
        }
    }

    let lightbox = lightbox_anchor(element, page_url, profile);
    let original_url = lightbox
        .as_ref()
        .map(|(target, _)| target.clone())
        .unwrap_or(source);

    let alt_text = element.value().attr("alt").map(clean_text).unwrap_or_default();

    let (mut title, mut description) = lightbox
        .as_ref()
        .and_then(|(_, anchor)| caption(*anchor))
        .map(|caption| split_caption(&caption))
        .unwrap_or_default();

    if title.is_empty() {
        title = element.value().attr("title").map(clean_text).unwrap_or_default();
    }
    if description.is_empty() {
        description = alt_text.clone();
    }

    let dimensions = DIMENSIONS
        .captures(&description)
        .map(|captures| captures[1].trim().to_string());

    let mut score = 1.0;
    if matches_pattern {
        score += 1.0;
    }
    if lightbox.is_some() {
        score += 1.0;
    }
    if !alt_text.is_empty() {
        score += 0.5;
    }
    if !title.is_empty() {
        score += 0.5;
    }

    let mut record = ImageRecord::discovered(
        original_url.as_str(),
        derive_filename(&original_url),
        page_url.as_str(),
        page_title,
    );
    record.alt_text = alt_text;
    record.title = title;
    record.description = description;
    record.dimensions = dimensions;
    record.score = score;

    Some(record)
}

/// First resolvable source among the lazy-loading attributes and `src`
fn image_source(element: ElementRef<'_>, page_url: &Url) -> Option<Url> {
    SOURCE_ATTRIBUTES
        .iter()
        .filter_map(|attribute| element.value().attr(attribute))
        .find_map(|value| resolve_href(value, page_url))
}

/// The enclosing anchor when it links to an image file
fn lightbox_anchor<'a>(
    element: ElementRef<'a>,
    page_url: &Url,
    profile: &SiteProfile,
) -> Option<(Url, ElementRef<'a>)> {
    let anchor = element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "a")?;

    let target = resolve_href(anchor.value().attr("href")?, page_url)?;
    let extension = path_extension(&target)?;
    profile
        .is_supported_extension(&extension)
        .then_some((target, anchor))
}

fn caption(anchor: ElementRef<'_>) -> Option<String> {
    CAPTION_ATTRIBUTES
        .iter()
        .filter_map(|attribute| anchor.value().attr(attribute))
        .find(|value| !value.trim().is_empty())
        .map(str::to_string)
}

/// Splits a lightbox caption into title and description at the first line break
///
/// `<b>Le port</b><br>Huile 40 x5 0 cm` gives `("Le port", "Huile 40 x50 cm")`.
pub fn split_caption(caption: &str) -> (String, String) {
    let mut parts = LINE_BREAK.splitn(caption, 2);
    let title = parts.next().map(clean_caption_text).unwrap_or_default();
    let description = parts.next().map(clean_caption_text).unwrap_or_default();
    (title, description)
}

fn clean_caption_text(text: &str) -> String {
    fix_dimensions_spacing(&clean_text(text))
}

/// Strips tags and collapses whitespace
pub fn clean_text(text: &str) -> String {
    let stripped = TAG.replace_all(text, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Repairs dimensions whose digits were split by stray whitespace
pub fn fix_dimensions_spacing(text: &str) -> String {
    BROKEN_DIMENSION.replace_all(text, "x${1}${2}").into_owned()
}

/// Filename of an image: its sanitized last path segment
///
/// URLs without a usable segment get a stable name derived from a hash of
/// the URL.
pub fn derive_filename(url: &Url) -> String {
    let name = last_path_segment(url)
        .map(|segment| sanitize_filename::sanitize(segment.trim()))
        .unwrap_or_default();

    if name.is_empty() || name.starts_with('.') {
        let digest = hex::encode(Sha256::digest(url.as_str().as_bytes()));
        format!("image_{}.jpg", &digest[..12])
    } else {
        name
    }
}

fn find_next_page(
    document: &Html,
    page_url: &Url,
    page_index: u32,
    profile: &SiteProfile,
) -> Option<Url> {
    let wanted = (page_index + 1).to_string();
    let mut fallback = None;

    for link in document.select(&profile.links) {
        let Some(target) = link
            .value()
            .attr("href")
            .and_then(|href| resolve_href(href, page_url))
        else {
            continue;
        };
        if target == *page_url {
            continue;
        }

        let text = clean_text(&link.text().collect::<String>());

        if text == wanted {
            let carries_page_param = profile
                .page_param
                .as_deref()
                .map_or(true, |param| query_param(&target, param).is_some());
            if carries_page_param {
                return Some(target);
            }
        }

        if fallback.is_none() {
            let rel_next = link
                .value()
                .attr("rel")
                .is_some_and(|rel| rel.split_whitespace().any(|t| t.eq_ignore_ascii_case("next")));
            if rel_next || profile.next_link_pattern.is_match(&text) {
                fallback = Some(target);
            }
        }
    }

    fallback
}
