use crate::output::{format_markdown_summary, CrawlSummary, LedgerStatistics};
use crate::state::ImageRecord;
use crate::storage::{
    write_atomic, write_json, RunManifest, RunStatus, StorageError, StorageResult, IMAGES_DIR,
    LEDGER_FILE, MANIFEST_FILE, SUMMARY_FILE,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One crawl run and its in-memory ledger
///
/// A run only ever writes inside its own directory. Records are appended by
/// the coordinator and persisted on `flush` and `finalize`.
#[derive(Debug)]
pub struct Run {
    run_id: String,
    root_directory: PathBuf,
    started_at: DateTime<Utc>,
    config_hash: String,
    records: Vec<ImageRecord>,
    seen_urls: HashSet<String>,
}

impl Run {
    /// Starts a run in an already allocated directory and writes its `running` manifest
    pub(crate) async fn start(
        run_id: String,
        root_directory: PathBuf,
        config_hash: &str,
    ) -> StorageResult<Self> {
        let run = Self {
            run_id,
            root_directory,
            started_at: Utc::now(),
            config_hash: config_hash.to_string(),
            records: Vec::new(),
            seen_urls: HashSet::new(),
        };

        run.write_manifest(RunStatus::Running, None, None).await?;
        Ok(run)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    /// Returns true if a record with this original URL is already in the ledger
    pub fn contains(&self, original_url: &str) -> bool {
        self.seen_urls.contains(original_url)
    }

    /// Path, relative to the `crawl_runs` directory, of an asset of this run
    pub fn local_path(&self, category_dir: &str, filename: &str) -> String {
        format!("{}/{}/{}/{}", self.run_id, IMAGES_DIR, category_dir, filename)
    }

    /// Appends records to the ledger, dropping any whose URL is already present
    ///
    /// Returns the number of records appended.
    pub fn append_records(&mut self, records: Vec<ImageRecord>) -> usize {
        let mut appended = 0;
        for record in records {
            if self.seen_urls.insert(record.original_url.clone()) {
                self.records.push(record);
                appended += 1;
            } else {
                tracing::debug!("Ledger already holds {}", record.original_url);
            }
        }
        appended
    }

    /// Writes the ledger as it stands
    pub async fn flush(&self) -> StorageResult<()> {
        write_json(&self.root_directory.join(LEDGER_FILE), &self.records).await?;
        tracing::debug!(
            "Flushed {} records to {}",
            self.records.len(),
            self.root_directory.display()
        );
        Ok(())
    }

    /// Writes the final ledger, manifest and (optionally) markdown summary
    pub async fn finalize(
        self,
        status: RunStatus,
        summary: &CrawlSummary,
        write_summary: bool,
    ) -> StorageResult<RunManifest> {
        self.flush().await?;

        let manifest = self
            .write_manifest(status, Some(Utc::now()), Some(summary.clone()))
            .await?;

        if write_summary {
            let stats = LedgerStatistics::from_records(&self.run_id, &self.records);
            let markdown = format_markdown_summary(&manifest, &stats);
            write_atomic(&self.root_directory.join(SUMMARY_FILE), markdown.as_bytes()).await?;
        }

        tracing::info!(
            "Run {} finalized ({}, {} records)",
            self.run_id,
            status,
            self.records.len()
        );
        Ok(manifest)
    }

    async fn write_manifest(
        &self,
        status: RunStatus,
        finished_at: Option<DateTime<Utc>>,
        summary: Option<CrawlSummary>,
    ) -> StorageResult<RunManifest> {
        let manifest = RunManifest {
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            finished_at,
            status,
            config_hash: self.config_hash.clone(),
            summary,
        };

        if !self.root_directory.is_dir() {
            return Err(StorageError::RunNotFound(self.run_id.clone()));
        }
        write_json(&self.root_directory.join(MANIFEST_FILE), &manifest).await?;
        Ok(manifest)
    }
}
