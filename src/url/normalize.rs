use crate::UrlError;
use url::Url;

/// Click-tracking query parameters dropped during normalization
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Normalizes a URL into the form used as a record and visit key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require an HTTP(S) scheme and a host (the parser lowercases the host)
/// 3. Remove the fragment
/// 4. Remove tracking query parameters (`utm_*`, `fbclid`, `gclid`, `mc_eid`)
/// 5. Remove an empty query string
///
/// The path and the order of the remaining query parameters are kept: gallery
/// pages are addressed by query strings and the site's own spelling of them
/// is what ends up in the ledger.
///
/// # Examples
///
/// ```
/// use gallery_harvest::url::normalize_url;
///
/// let url = normalize_url("https://Gallery.Example.com/default.asp?galerie=3&utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "https://gallery.example.com/default.asp?galerie=3");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingDomain),
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let removed_any = url.query_pairs().count() != kept.len();
        if kept.is_empty() {
            url.set_query(None);
        } else if removed_any {
            url.query_pairs_mut().clear().extend_pairs(kept.iter());
        }
    }

    Ok(url)
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
