//! Crawler module for gallery fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - Rate-limited HTTP fetching with retry logic
//! - Category enumeration and page extraction
//! - Pagination walking within one category
//! - Image downloads honouring the dedup index
//! - Overall crawl coordination

mod categories;
mod coordinator;
mod downloader;
mod extractor;
mod fetcher;
mod walker;

pub use categories::{discover_gallery, enumerate_categories, CategoryListing};
pub use coordinator::{run_crawl, Coordinator};
pub use downloader::{DownloadOutcome, Downloader};
pub use extractor::{
    clean_text, derive_filename, extract_page, fix_dimensions_spacing, split_caption,
    PageExtraction,
};
pub use fetcher::{build_http_client, Fetcher, RetryPolicy};
pub use walker::{walk_category, PaginationWalker, Termination, WalkedPage};
