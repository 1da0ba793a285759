//! Output module for crawl summaries and reports
//!
//! This module handles:
//! - Counting crawl outcomes while a run is in progress
//! - Computing statistics over a finished run's ledger
//! - Generating markdown summaries of runs

mod markdown;
pub mod stats;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use stats::{
    print_crawl_summary, print_statistics, CategoryStatistics, CategorySummary, CrawlSummary,
    LedgerStatistics,
};
