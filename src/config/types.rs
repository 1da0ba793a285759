use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Gallery-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub site: SiteConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// The single domain every fetched URL must belong to
    #[serde(rename = "allowed-domain")]
    pub allowed_domain: String,

    /// Landing page of the site
    #[serde(rename = "start-url")]
    pub start_url: String,

    /// Maximum number of requests in flight, pages and images combined
    #[serde(rename = "max-concurrent-requests", default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: u32,

    /// Delay each request slot waits before issuing a request (seconds)
    #[serde(rename = "request-delay", default = "default_request_delay")]
    pub request_delay: f64,

    /// Request timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Extra attempts after a transient failure
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the first retry, doubled on every further retry (milliseconds)
    #[serde(rename = "retry-backoff-ms", default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Only the first N categories are crawled when set
    #[serde(rename = "max-categories", default)]
    pub max_categories: Option<u32>,

    /// Upper bound on pages walked per category when set
    #[serde(rename = "max-pages-per-category", default)]
    pub max_pages_per_category: Option<u32>,

    /// Image bodies larger than this are rejected
    #[serde(rename = "max-image-bytes", default = "default_max_image_bytes")]
    pub max_image_bytes: u64,
}

impl CrawlerConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.request_delay)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory holding `crawl_runs/`
    #[serde(rename = "crawl-root")]
    pub crawl_root: String,

    /// Write `summary.md` next to each run's ledger
    #[serde(rename = "write-summary", default = "default_true")]
    pub write_summary: bool,
}

/// Markup conventions of the gallery site
///
/// The defaults describe Odexpo gallery sites. Optional string settings are
/// disabled by setting them to an empty string.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Link on the start page leading to the gallery page
    #[serde(rename = "gallery-link-selector", default)]
    pub gallery_link_selector: Option<String>,

    /// Items of the category selector control (`<option>` or `<a>` elements)
    #[serde(rename = "category-selector", default = "default_category_selector")]
    pub category_selector: String,

    /// Query parameter identifying a category
    #[serde(rename = "category-param", default = "default_category_param")]
    pub category_param: Option<String>,

    /// Query parameter carrying a human-readable category label
    #[serde(rename = "category-label-param", default = "default_category_label_param")]
    pub category_label_param: Option<String>,

    /// Candidate image elements
    #[serde(rename = "image-selector", default = "default_image_selector")]
    pub image_selector: String,

    /// Regex a source must match to count as a gallery image
    #[serde(rename = "image-url-pattern", default = "default_image_url_pattern")]
    pub image_url_pattern: Option<String>,

    /// Query parameter carrying the page number
    #[serde(rename = "page-param", default = "default_page_param")]
    pub page_param: Option<String>,

    /// Regex matched against link text to find a "next page" link
    #[serde(rename = "next-link-pattern", default = "default_next_link_pattern")]
    pub next_link_pattern: String,

    /// File extensions accepted as images (lowercase, without dot)
    #[serde(rename = "supported-extensions", default = "default_supported_extensions")]
    pub supported_extensions: Vec<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            gallery_link_selector: None,
            category_selector: default_category_selector(),
            category_param: default_category_param(),
            category_label_param: default_category_label_param(),
            image_selector: default_image_selector(),
            image_url_pattern: default_image_url_pattern(),
            page_param: default_page_param(),
            next_link_pattern: default_next_link_pattern(),
            supported_extensions: default_supported_extensions(),
        }
    }
}

fn default_max_concurrent_requests() -> u32 {
    3
}

fn default_request_delay() -> f64 {
    0.5
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_max_image_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_category_selector() -> String {
    "a[href*='galerie='][href*='ng=']".to_string()
}

fn default_category_param() -> Option<String> {
    Some("galerie".to_string())
}

fn default_category_label_param() -> Option<String> {
    Some("ng".to_string())
}

fn default_image_selector() -> String {
    "img".to_string()
}

fn default_image_url_pattern() -> Option<String> {
    Some(r"images/\d+/".to_string())
}

fn default_page_param() -> Option<String> {
    Some("num".to_string())
}

fn default_next_link_pattern() -> String {
    "(?i)^(next|suivant|»|>)$".to_string()
}

fn default_supported_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "webp", "bmp"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}
