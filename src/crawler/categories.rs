//! Category enumeration and gallery discovery

use crate::config::SiteProfile;
use crate::crawler::extractor::clean_text;
use crate::state::Category;
use crate::url::{query_param, resolve_href, with_query_param, DomainGuard};
use crate::ExtractionError;
use scraper::{ElementRef, Html};
use std::collections::HashSet;
use url::Url;

/// Categories found on the gallery page
#[derive(Debug, Clone)]
pub struct CategoryListing {
    /// In page order, each id once
    pub categories: Vec<Category>,
    /// Items whose landing URL was outside the allowed domain
    pub rejected: usize,
}

/// Parses the category control of the gallery page
///
/// `<option>` items contribute their `value`, any other element its `href`.
/// Fails with `NoCategoryControl` when the selector matches nothing and with
/// `NoCategories` when no item yields a usable category.
pub fn enumerate_categories(
    html: &str,
    gallery_url: &Url,
    profile: &SiteProfile,
    guard: &DomainGuard,
) -> Result<CategoryListing, ExtractionError> {
    let document = Html::parse_document(html);
    let items: Vec<ElementRef<'_>> = document.select(&profile.category_items).collect();

    if items.is_empty() {
        return Err(ExtractionError::NoCategoryControl {
            url: gallery_url.to_string(),
            selector: profile.category_selector.clone(),
        });
    }

    let mut categories = Vec::new();
    let mut seen = HashSet::new();
    let mut rejected = 0;

    for item in items {
        let Some(category) = parse_item(item, gallery_url, profile) else {
            continue;
        };

        if !guard.is_allowed(&category.landing_url) {
            tracing::warn!(
                "Skipping category '{}': {} is outside the allowed domain",
                category.label,
                category.landing_url
            );
            rejected += 1;
            continue;
        }

        if seen.insert(category.id.clone()) {
            categories.push(category);
        }
    }

    if categories.is_empty() {
        return Err(ExtractionError::NoCategories {
            url: gallery_url.to_string(),
        });
    }

    tracing::info!(
        "Found {} categories on {}",
        categories.len(),
        gallery_url
    );

    Ok(CategoryListing {
        categories,
        rejected,
    })
}

fn parse_item(item: ElementRef<'_>, gallery_url: &Url, profile: &SiteProfile) -> Option<Category> {
    let attribute = if item.value().name() == "option" {
        "value"
    } else {
        "href"
    };
    let raw = item.value().attr(attribute)?.trim();
    if raw.is_empty() || raw == "#" {
        return None;
    }

    let is_bare_id = !raw.contains(['?', '/', '=']);
    let landing_url = match (&profile.category_param, is_bare_id) {
        (Some(param), true) => with_query_param(gallery_url, param, raw),
        _ => resolve_href(raw, gallery_url)?,
    };

    let id = profile
        .category_param
        .as_deref()
        .and_then(|param| query_param(&landing_url, param))
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| raw.to_string());

    let text = clean_text(&item.text().collect::<String>());
    let label = profile
        .category_label_param
        .as_deref()
        .and_then(|param| query_param(&landing_url, param))
        .map(|label| clean_text(&label))
        .filter(|label| !label.is_empty())
        .or_else(|| (!text.is_empty()).then_some(text))
        .unwrap_or_else(|| id.clone());

    Some(Category::new(id, label, landing_url))
}

/// Finds the gallery page link on the start page
///
/// Returns None when the selector matches no link on the allowed domain.
pub fn discover_gallery(
    html: &str,
    start_url: &Url,
    profile: &SiteProfile,
    guard: &DomainGuard,
) -> Option<Url> {
    let selector = profile.gallery_link.as_ref()?;
    let document = Html::parse_document(html);

    let found = document
        .select(selector)
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| resolve_href(href, start_url))
        .find(|url| guard.is_allowed(url));
    found
}
