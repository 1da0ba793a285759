//! Crawl counters and ledger statistics
//!
//! `CrawlSummary` is accumulated by the coordinator while a run is in
//! progress and stored in the run manifest. `LedgerStatistics` is computed
//! after the fact from a run's `metadata.json`.

use crate::state::{DownloadStatus, ImageRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of most recent filenames listed per category
const RECENT_FILENAMES: usize = 3;

/// Counters of one crawl run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlSummary {
    pub run_id: String,

    /// Categories returned by the enumerator
    pub categories_total: usize,
    pub categories_visited: usize,
    pub pages_walked: usize,
    /// Pages whose fetch failed after all retries
    pub pages_failed: usize,
    pub images_recorded: usize,
    pub images_downloaded: usize,
    pub images_skipped_duplicate: usize,
    pub images_failed: usize,
    pub images_cancelled: usize,
    /// URLs dropped for being outside the allowed domain
    pub urls_rejected: usize,
    /// Images seen again in a later category or page of the same run
    pub duplicates_in_run: usize,
    pub bytes_downloaded: u64,
    /// Categories that ended on an empty page without a next link
    pub low_confidence_terminations: usize,
    pub cancelled: bool,
    pub categories: Vec<CategorySummary>,
}

/// Outcome of walking one category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub id: String,
    pub label: String,
    pub pages: usize,
    pub images: usize,
    /// Why the walk stopped
    pub termination: String,
    pub low_confidence: bool,
}

impl CrawlSummary {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Self::default()
        }
    }

    /// Counts the outcome of one record handed back by the downloader
    pub fn record_outcome(&mut self, record: &ImageRecord) {
        self.images_recorded += 1;
        match record.status {
            DownloadStatus::Downloaded => {
                self.images_downloaded += 1;
                self.bytes_downloaded += record.size_bytes;
            }
            DownloadStatus::AlreadyPresent => self.images_skipped_duplicate += 1,
            DownloadStatus::Failed => self.images_failed += 1,
            DownloadStatus::Cancelled => self.images_cancelled += 1,
            DownloadStatus::Pending => {}
        }
    }

    /// Counts a record whose asset redirected outside the allowed domain
    ///
    /// The record stays in the ledger as failed but is counted as rejected.
    pub fn record_rejected(&mut self) {
        self.images_recorded += 1;
        self.urls_rejected += 1;
    }

    /// Adds the outcome of a finished category walk
    pub fn record_category(&mut self, category: CategorySummary) {
        self.categories_visited += 1;
        if category.low_confidence {
            self.low_confidence_terminations += 1;
        }
        self.categories.push(category);
    }
}

/// Prints the end-of-run summary to stdout
pub fn print_crawl_summary(summary: &CrawlSummary) {
    println!("=== Crawl Summary ({}) ===\n", summary.run_id);

    if summary.cancelled {
        println!("Crawl was interrupted; the ledger holds everything found so far.\n");
    }

    println!(
        "  Categories visited:       {} / {}",
        summary.categories_visited, summary.categories_total
    );
    println!("  Pages walked:             {}", summary.pages_walked);
    println!("  Pages failed:             {}", summary.pages_failed);
    println!("  Images recorded:          {}", summary.images_recorded);
    println!(
        "  Images downloaded:        {} ({:.2} MB)",
        summary.images_downloaded,
        megabytes(summary.bytes_downloaded)
    );
    println!(
        "  Skipped as duplicate:     {}",
        summary.images_skipped_duplicate
    );
    println!("  Images failed:            {}", summary.images_failed);
    if summary.images_cancelled > 0 {
        println!("  Images cancelled:         {}", summary.images_cancelled);
    }
    println!("  Duplicates within run:    {}", summary.duplicates_in_run);
    println!("  URLs rejected (domain):   {}", summary.urls_rejected);
    println!();

    if summary.low_confidence_terminations > 0 {
        println!(
            "Warning: {} categories ended on an empty page without a next link.",
            summary.low_confidence_terminations
        );
        println!("Their image counts may be incomplete; check the site manually.\n");
    }

    if !summary.categories.is_empty() {
        println!("Categories:");
        for category in &summary.categories {
            println!(
                "  {} ({}): {} images on {} pages, {}{}",
                category.label,
                category.id,
                category.images,
                category.pages,
                category.termination,
                if category.low_confidence { " [low confidence]" } else { "" }
            );
        }
    }
}

/// Statistics of one run's ledger
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerStatistics {
    pub run_id: String,
    pub total_images: usize,
    /// Bytes of assets on disk for this ledger's records
    pub total_bytes: u64,
    pub with_description: usize,
    pub with_dimensions: usize,
    /// Record count per download status
    pub by_status: BTreeMap<String, usize>,
    /// Per-category breakdown, in ledger order
    pub categories: Vec<CategoryStatistics>,
}

/// Per-category part of `LedgerStatistics`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryStatistics {
    pub id: String,
    pub label: String,
    pub images: usize,
    pub bytes: u64,
    /// Filenames of the last images recorded for the category
    pub recent_filenames: Vec<String>,
}

impl LedgerStatistics {
    /// Computes statistics over a run's ledger
    pub fn from_records(run_id: impl Into<String>, records: &[ImageRecord]) -> Self {
        let mut stats = Self {
            run_id: run_id.into(),
            total_images: records.len(),
            ..Self::default()
        };

        for record in records {
            if record.status.has_asset() {
                stats.total_bytes += record.size_bytes;
            }
            if !record.description.is_empty() {
                stats.with_description += 1;
            }
            if record.dimensions.is_some() {
                stats.with_dimensions += 1;
            }
            *stats
                .by_status
                .entry(record.status.as_str().to_string())
                .or_insert(0) += 1;

            let position = match stats
                .categories
                .iter()
                .position(|c| c.id == record.category)
            {
                Some(position) => position,
                None => {
                    stats.categories.push(CategoryStatistics {
                        id: record.category.clone(),
                        label: record.category_label.clone(),
                        ..CategoryStatistics::default()
                    });
                    stats.categories.len() - 1
                }
            };

            let category = &mut stats.categories[position];
            category.images += 1;
            if record.status.has_asset() {
                category.bytes += record.size_bytes;
            }
            category.recent_filenames.push(record.filename.clone());
            if category.recent_filenames.len() > RECENT_FILENAMES {
                category.recent_filenames.remove(0);
            }
        }

        stats
    }

    pub fn total_megabytes(&self) -> f64 {
        megabytes(self.total_bytes)
    }

    pub fn status_count(&self, status: DownloadStatus) -> usize {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}

/// Prints ledger statistics to stdout in a formatted manner
pub fn print_statistics(stats: &LedgerStatistics) {
    println!("=== Run Statistics ({}) ===\n", stats.run_id);

    println!("Overview:");
    println!("  Total images: {}", stats.total_images);
    println!("  Total size: {:.2} MB", stats.total_megabytes());
    println!("  With description: {}", stats.with_description);
    println!("  With dimensions: {}", stats.with_dimensions);
    println!();

    println!("Images by Status:");
    for (status, count) in &stats.by_status {
        let percentage = if stats.total_images > 0 {
            (*count as f64 / stats.total_images as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    if !stats.categories.is_empty() {
        println!("Categories ({}):", stats.categories.len());
        for category in &stats.categories {
            println!(
                "  {} ({}): {} images, {:.2} MB",
                display_label(category),
                category.id,
                category.images,
                megabytes(category.bytes)
            );
            if !category.recent_filenames.is_empty() {
                println!("    recent: {}", category.recent_filenames.join(", "));
            }
        }
    }
}

pub(crate) fn display_label(category: &CategoryStatistics) -> &str {
    if category.label.is_empty() {
        &category.id
    } else {
        &category.label
    }
}

pub(crate) fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
