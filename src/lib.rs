//! Gallery-Harvest: a breadth-first gallery crawler
//!
//! This crate walks a paginated gallery site category by category, extracts
//! per-image metadata, downloads the image assets and keeps one JSON ledger
//! per crawl run. Assets downloaded by earlier runs are never fetched again.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Gallery-Harvest operations
///
/// Only the variants reaching the caller of [`crawler::run_crawl`] are fatal;
/// per-page and per-image failures are recovered inside the crawl.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Category enumeration failed: {0}")]
    Enumeration(#[from] ExtractionError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid CSS selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Invalid regular expression '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Errors produced by the fetcher
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("URL outside the allowed domain: {url}")]
    DomainRejected { url: String },

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Body of {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: u64 },

    #[error("Fetch cancelled: {url}")]
    Cancelled { url: String },
}

impl FetchError {
    /// Returns true if another attempt at the same URL may succeed
    ///
    /// Server errors, 408, 429, timeouts and network failures are transient.
    /// Domain rejections, other client errors, oversize bodies and
    /// cancellation are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::DomainRejected { .. } | Self::TooLarge { .. } | Self::Cancelled { .. } => false,
        }
    }

    /// The URL the failed request was for
    pub fn url(&self) -> &str {
        match self {
            Self::DomainRejected { url }
            | Self::Http { url, .. }
            | Self::Timeout { url }
            | Self::Network { url, .. }
            | Self::TooLarge { url, .. }
            | Self::Cancelled { url } => url,
        }
    }
}

/// Errors raised while turning the gallery page into categories
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Category selector '{selector}' matched nothing on {url}")]
    NoCategoryControl { url: String, selector: String },

    #[error("Category selector on {url} yielded no usable categories")]
    NoCategories { url: String },

    #[error("Could not fetch gallery page: {0}")]
    GalleryFetch(#[from] FetchError),
}

/// Result type alias for Gallery-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_crawl, Coordinator};
pub use output::CrawlSummary;
pub use state::{Category, DedupIndex, DownloadStatus, ImageRecord};
pub use storage::{Run, RunStore};
pub use url::{normalize_url, DomainGuard};
