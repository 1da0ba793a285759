//! Crawler coordinator - main crawl orchestration logic
//!
//! The coordinator drives one crawl breadth-first:
//! - discovering the gallery page and enumerating its categories
//! - walking each category's pages, strictly one category at a time
//! - preparing and downloading the images of each page
//! - appending records to the run's ledger and flushing it per category
//! - finalizing the run, also when the crawl is cancelled

use crate::config::{Config, SiteProfile};
use crate::crawler::categories::{discover_gallery, enumerate_categories, CategoryListing};
use crate::crawler::downloader::{DownloadOutcome, Downloader};
use crate::crawler::fetcher::Fetcher;
use crate::crawler::walker::{PaginationWalker, Termination};
use crate::output::{CategorySummary, CrawlSummary};
use crate::state::{Category, DedupIndex, ImageRecord};
use crate::storage::{Run, RunStatus, RunStore};
use crate::{ExtractionError, HarvestError};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Config,
    config_hash: String,
    profile: SiteProfile,
    fetcher: Fetcher,
    downloader: Downloader,
    store: RunStore,
    dedup: DedupIndex,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// `dedup` holds the assets of earlier runs; it is extended with every
    /// asset this crawl writes.
    pub fn new(
        config: Config,
        config_hash: impl Into<String>,
        dedup: DedupIndex,
        cancel: CancellationToken,
    ) -> Result<Self, HarvestError> {
        let profile = SiteProfile::compile(&config.site)?;
        let fetcher = Fetcher::new(&config, cancel.clone())?;
        let store = RunStore::new(&config.output.crawl_root);
        let downloader = Downloader::new(
            fetcher.clone(),
            store.runs_dir(),
            config.crawler.max_image_bytes,
        );

        Ok(Self {
            config,
            config_hash: config_hash.into(),
            profile,
            fetcher,
            downloader,
            store,
            dedup,
            cancel,
        })
    }

    pub fn dedup_index(&self) -> &DedupIndex {
        &self.dedup
    }

    pub fn run_store(&self) -> &RunStore {
        &self.store
    }

    /// Finds the gallery page and enumerates its categories
    ///
    /// Any failure here is fatal for the crawl.
    pub async fn discover_categories(&self) -> Result<CategoryListing, HarvestError> {
        let start_url = Url::parse(&self.config.crawler.start_url)?;
        let (gallery_url, html) = self.gallery_page(&start_url).await?;

        let listing = enumerate_categories(&html, &gallery_url, &self.profile, self.fetcher.guard())?;
        Ok(listing)
    }

    async fn gallery_page(&self, start_url: &Url) -> Result<(Url, String), ExtractionError> {
        let start_html = self.fetcher.fetch_text(start_url).await?;

        if self.profile.gallery_link.is_none() {
            return Ok((start_url.clone(), start_html));
        }

        match discover_gallery(&start_html, start_url, &self.profile, self.fetcher.guard()) {
            Some(gallery_url) if gallery_url != *start_url => {
                tracing::info!("Gallery page: {}", gallery_url);
                let html = self.fetcher.fetch_text(&gallery_url).await?;
                Ok((gallery_url, html))
            }
            Some(_) => Ok((start_url.clone(), start_html)),
            None => {
                tracing::warn!(
                    "No gallery link on {}, looking for categories on the start page",
                    start_url
                );
                Ok((start_url.clone(), start_html))
            }
        }
    }

    /// Runs the crawl
    ///
    /// Returns the run's counters. Only category enumeration and run store
    /// failures are returned as errors; page and image failures are counted
    /// and the crawl moves on.
    pub async fn run(&mut self) -> Result<CrawlSummary, HarvestError> {
        let listing = self.discover_categories().await?;
        let mut run = self.store.create_run(&self.config_hash).await?;

        let mut summary = CrawlSummary::new(run.run_id());
        summary.categories_total = listing.categories.len();
        summary.urls_rejected += listing.rejected;

        let limit = self
            .config
            .crawler
            .max_categories
            .map(|max| max as usize)
            .unwrap_or(usize::MAX);
        let categories: Vec<Category> = listing.categories.into_iter().take(limit).collect();

        tracing::info!(
            "Starting run {}: {} of {} categories",
            run.run_id(),
            categories.len(),
            summary.categories_total
        );

        let mut taken_names: HashMap<String, HashSet<String>> = HashMap::new();

        for (position, category) in categories.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }

            tracing::info!(
                "Category {}/{}: '{}' ({})",
                position + 1,
                categories.len(),
                category.label,
                category.id
            );

            let category_summary = self
                .crawl_category(category, &mut run, &mut summary, &mut taken_names)
                .await;

            if category_summary.termination == Termination::FetchFailed.as_str() {
                summary.pages_failed += 1;
            }
            summary.record_category(category_summary);

            run.flush().await?;
        }

        let status = if self.cancel.is_cancelled() {
            tracing::warn!("Crawl interrupted, finalizing run {}", run.run_id());
            summary.cancelled = true;
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };

        run.finalize(status, &summary, self.config.output.write_summary)
            .await?;

        tracing::info!(
            "Run {}: {} images recorded, {} downloaded, {} already present, {} failed",
            summary.run_id,
            summary.images_recorded,
            summary.images_downloaded,
            summary.images_skipped_duplicate,
            summary.images_failed
        );

        Ok(summary)
    }

    async fn crawl_category(
        &mut self,
        category: &Category,
        run: &mut Run,
        summary: &mut CrawlSummary,
        taken_names: &mut HashMap<String, HashSet<String>>,
    ) -> CategorySummary {
        let mut category_summary = CategorySummary {
            id: category.id.clone(),
            label: category.label.clone(),
            ..CategorySummary::default()
        };

        let directory = category.directory_name();
        let taken = taken_names.entry(directory.clone()).or_default();
        let mut walker = PaginationWalker::new(
            &self.fetcher,
            &self.profile,
            category,
            self.config.crawler.max_pages_per_category,
        );

        while let Some(page) = walker.next_page().await {
            summary.pages_walked += 1;
            summary.urls_rejected += page.rejected;
            category_summary.pages += 1;

            let prepared = prepare_records(page.images, category, &directory, run, summary, taken);
            let downloaded =
                download_all(&self.downloader, &self.dedup, prepared, self.concurrency()).await;

            let mut records = Vec::with_capacity(downloaded.len());
            for outcome in downloaded {
                if outcome.rejected {
                    summary.record_rejected();
                } else {
                    summary.record_outcome(&outcome.record);
                    self.dedup.record(&outcome.record);
                }
                records.push(outcome.record);
            }
            category_summary.images += run.append_records(records);
        }

        let termination = walker.termination().unwrap_or(Termination::LastPage);
        category_summary.termination = termination.to_string();
        category_summary.low_confidence = termination.is_low_confidence();

        tracing::info!(
            "Category '{}' done: {} images on {} pages ({})",
            category.label,
            category_summary.images,
            category_summary.pages,
            termination
        );

        category_summary
    }

    fn concurrency(&self) -> usize {
        self.config.crawler.max_concurrent_requests.max(1) as usize
    }
}

/// Fills in run-level fields and drops images the run already recorded
///
/// Each record gets a `local_path` inside the category directory; names
/// already used in that directory get a `_1`, `_2`, ... suffix.
fn prepare_records(
    images: Vec<ImageRecord>,
    category: &Category,
    directory: &str,
    run: &Run,
    summary: &mut CrawlSummary,
    taken: &mut HashSet<String>,
) -> Vec<ImageRecord> {
    let mut prepared = Vec::with_capacity(images.len());

    for mut record in images {
        if run.contains(&record.original_url) {
            tracing::debug!("{} already recorded in this run", record.original_url);
            summary.duplicates_in_run += 1;
            continue;
        }

        let filename = unique_filename(taken, &record.filename);
        record.category = category.id.clone();
        record.category_label = category.label.clone();
        record.crawl_run = run.run_id().to_string();
        record.local_path = run.local_path(directory, &filename);
        record.filename = filename;
        prepared.push(record);
    }

    prepared
}

/// Downloads a page's records concurrently, keeping their order
async fn download_all(
    downloader: &Downloader,
    dedup: &DedupIndex,
    records: Vec<ImageRecord>,
    concurrency: usize,
) -> Vec<DownloadOutcome> {
    stream::iter(records)
        .map(|record| downloader.download(record, dedup))
        .buffered(concurrency)
        .collect()
        .await
}

/// Reserves `name` in `taken`, adding a numeric suffix if it is already used
fn unique_filename(taken: &mut HashSet<String>, name: &str) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => (stem, Some(extension)),
        _ => (name, None),
    };

    let mut counter = 1;
    loop {
        let candidate = match extension {
            Some(extension) => format!("{}_{}.{}", stem, counter, extension),
            None => format!("{}_{}", stem, counter),
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

/// Runs a complete crawl operation
///
/// Builds the dedup index from the ledgers under the configured crawl root,
/// then crawls into a new run.
pub async fn run_crawl(
    config: Config,
    config_hash: &str,
    cancel: CancellationToken,
) -> Result<CrawlSummary, HarvestError> {
    let store = RunStore::new(&config.output.crawl_root);
    let dedup = store.build_dedup_index().await?;

    let mut coordinator = Coordinator::new(config, config_hash, dedup, cancel)?;
    coordinator.run().await
}
