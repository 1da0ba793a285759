//! URL handling module for Gallery-Harvest
//!
//! This module provides URL normalization, link resolution, query parameter
//! access and the allowed-domain guard every fetch goes through.

mod matcher;
mod normalize;

use crate::FetchError;
use url::Url;

// Re-export main functions
pub use matcher::{extract_domain, matches_allowed};
pub use normalize::normalize_url;

/// Restricts crawling to a single configured domain
///
/// The allowed domain also admits its `www.` form. A `*.example.com`
/// pattern admits the bare domain and every subdomain.
#[derive(Debug, Clone)]
pub struct DomainGuard {
    allowed: String,
}

impl DomainGuard {
    /// Creates a guard for the given domain or wildcard pattern
    pub fn new(allowed: &str) -> Self {
        Self {
            allowed: allowed.trim().to_lowercase(),
        }
    }

    /// The configured domain pattern
    pub fn allowed_domain(&self) -> &str {
        &self.allowed
    }

    /// Returns true if the URL is HTTP(S) and its host belongs to the allowed domain
    ///
    /// # Examples
    ///
    /// ```
    /// use gallery_harvest::url::DomainGuard;
    /// use url::Url;
    ///
    /// let guard = DomainGuard::new("gallery.example.com");
    /// assert!(guard.is_allowed(&Url::parse("https://gallery.example.com/a").unwrap()));
    /// assert!(guard.is_allowed(&Url::parse("https://www.gallery.example.com/a").unwrap()));
    /// assert!(!guard.is_allowed(&Url::parse("https://cdn.example.net/a").unwrap()));
    /// ```
    pub fn is_allowed(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        extract_domain(url)
            .map(|domain| matches_allowed(&self.allowed, &domain))
            .unwrap_or(false)
    }

    /// Fails with `FetchError::DomainRejected` when the URL is outside the allowed domain
    pub fn check(&self, url: &Url) -> Result<(), FetchError> {
        if self.is_allowed(url) {
            Ok(())
        } else {
            Err(FetchError::DomainRejected {
                url: url.to_string(),
            })
        }
    }
}

/// Resolves an `href`/`src`/`value` attribute to an absolute URL
///
/// Returns None if the value should be ignored:
/// - empty or fragment-only values
/// - javascript:, mailto:, tel: and data: schemes
/// - values that do not resolve to an HTTP(S) URL
///
/// The resolved URL is passed through [`normalize_url`].
pub fn resolve_href(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    normalize_url(absolute.as_str()).ok()
}

/// Returns the decoded value of the first query parameter with the given name
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Returns a copy of the URL with the query parameter set to `value`
///
/// Existing occurrences of the parameter are replaced; other parameters keep
/// their order.
pub fn with_query_param(url: &Url, name: &str, value: &str) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut updated = url.clone();
    {
        let mut query = updated.query_pairs_mut();
        query.clear();
        for (key, val) in &pairs {
            query.append_pair(key, val);
        }
        query.append_pair(name, value);
    }
    updated
}

/// Returns the last non-empty path segment of the URL
pub fn last_path_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
}

/// Returns the lowercase extension of the URL's last path segment
pub fn path_extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.last()?;
    let (stem, extension) = segment.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension.to_lowercase())
}
