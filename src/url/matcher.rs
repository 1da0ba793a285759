use url::Url;

/// Extracts the lowercase host of a URL, without port
///
/// # Examples
///
/// ```
/// use url::Url;
/// use gallery_harvest::url::extract_domain;
///
/// let url = Url::parse("https://Gallery.Example.COM:8443/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("gallery.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Checks if a host belongs to the allowed domain pattern
///
/// Three pattern forms are supported:
/// 1. Exact: "example.com" matches "example.com"
/// 2. The `www.` form of an exact pattern: "example.com" also matches "www.example.com"
/// 3. Wildcard: "*.example.com" matches "example.com" and any subdomain of it
///
/// Both arguments are expected in lowercase.
///
/// # Examples
///
/// ```
/// use gallery_harvest::url::matches_allowed;
///
/// assert!(matches_allowed("example.com", "example.com"));
/// assert!(matches_allowed("example.com", "www.example.com"));
/// assert!(!matches_allowed("example.com", "cdn.example.com"));
///
/// assert!(matches_allowed("*.example.com", "cdn.example.com"));
/// assert!(!matches_allowed("*.example.com", "example.org"));
/// ```
pub fn matches_allowed(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern || candidate.strip_prefix("www.") == Some(pattern)
    }
}
