//! Compiled form of the `[site]` configuration section

use crate::config::types::SiteConfig;
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;

/// Selectors and patterns describing the gallery markup, compiled once per crawl
#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub gallery_link: Option<Selector>,
    pub category_items: Selector,
    pub category_selector: String,
    pub category_param: Option<String>,
    pub category_label_param: Option<String>,
    pub images: Selector,
    pub image_url_pattern: Option<Regex>,
    pub page_param: Option<String>,
    pub next_link_pattern: Regex,
    pub supported_extensions: Vec<String>,
    pub links: Selector,
    pub title: Selector,
}

impl SiteProfile {
    /// Compiles every selector and regex of the site configuration
    ///
    /// Empty optional settings are treated as unset.
    pub fn compile(site: &SiteConfig) -> Result<Self, ConfigError> {
        let gallery_link = match non_empty(&site.gallery_link_selector) {
            Some(selector) => Some(compile_selector(&selector)?),
            None => None,
        };

        let image_url_pattern = match non_empty(&site.image_url_pattern) {
            Some(pattern) => Some(compile_regex(&pattern)?),
            None => None,
        };

        Ok(Self {
            gallery_link,
            category_items: compile_selector(&site.category_selector)?,
            category_selector: site.category_selector.clone(),
            category_param: non_empty(&site.category_param),
            category_label_param: non_empty(&site.category_label_param),
            images: compile_selector(&site.image_selector)?,
            image_url_pattern,
            page_param: non_empty(&site.page_param),
            next_link_pattern: compile_regex(&site.next_link_pattern)?,
            supported_extensions: site
                .supported_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            links: compile_selector("a[href]")?,
            title: compile_selector("title")?,
        })
    }

    /// Returns true if the extension is one of the accepted image types
    pub fn is_supported_extension(&self, extension: &str) -> bool {
        let extension = extension.to_lowercase();
        self.supported_extensions.iter().any(|ext| *ext == extension)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn compile_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

fn compile_regex(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}
