//! Image asset downloads

use crate::crawler::fetcher::Fetcher;
use crate::state::{DedupIndex, DownloadStatus, ImageRecord};
use crate::storage::write_atomic;
use crate::FetchError;
use std::path::PathBuf;
use url::Url;

/// Result of resolving one record
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub record: ImageRecord,
    /// The asset redirected outside the allowed domain
    pub rejected: bool,
}

impl From<ImageRecord> for DownloadOutcome {
    fn from(record: ImageRecord) -> Self {
        Self {
            record,
            rejected: false,
        }
    }
}

/// Fetches image assets into the `crawl_runs` directory
#[derive(Debug, Clone)]
pub struct Downloader {
    fetcher: Fetcher,
    runs_dir: PathBuf,
    max_image_bytes: u64,
}

impl Downloader {
    pub fn new(fetcher: Fetcher, runs_dir: impl Into<PathBuf>, max_image_bytes: u64) -> Self {
        Self {
            fetcher,
            runs_dir: runs_dir.into(),
            max_image_bytes,
        }
    }

    /// Resolves one prepared record to its final status
    ///
    /// A dedup hit whose file is still on disk is reused without a request.
    /// Otherwise the asset is fetched and written to the record's
    /// `local_path`. Failures are recorded on the record, never returned.
    /// A redirect leaving the allowed domain fails the record and marks the
    /// outcome as rejected.
    pub async fn download(&self, mut record: ImageRecord, dedup: &DedupIndex) -> DownloadOutcome {
        let bytes = match self.reuse_or_fetch(&mut record, dedup).await {
            Some(Ok(bytes)) => bytes,
            Some(Err(FetchError::DomainRejected { url })) => {
                tracing::warn!("{} redirected off-domain to {}", record.original_url, url);
                record.fail(FetchError::DomainRejected { url });
                return DownloadOutcome {
                    record,
                    rejected: true,
                };
            }
            Some(Err(FetchError::Cancelled { .. })) => {
                record.status = DownloadStatus::Cancelled;
                return record.into();
            }
            Some(Err(e)) => {
                tracing::warn!("Download failed: {}", e);
                record.fail(e);
                return record.into();
            }
            None => return record.into(),
        };

        self.store(record, &bytes).await.into()
    }

    /// Returns None when the record is already resolved
    async fn reuse_or_fetch(
        &self,
        record: &mut ImageRecord,
        dedup: &DedupIndex,
    ) -> Option<Result<Vec<u8>, FetchError>> {
        if let Some(existing) = dedup.find_existing(&record.original_url).await {
            tracing::debug!(
                "Already have {} at {}",
                record.original_url,
                existing.local_path
            );
            record.local_path = existing.local_path;
            record.size_bytes = existing.size_bytes;
            record.status = DownloadStatus::AlreadyPresent;
            return None;
        }

        let url = match Url::parse(&record.original_url) {
            Ok(url) => url,
            Err(e) => {
                record.fail(e);
                return None;
            }
        };

        match self.fetcher.fetch_bytes(&url, self.max_image_bytes).await {
            Ok(bytes) if bytes.is_empty() => {
                record.fail(format!("Empty body for {}", url));
                None
            }
            result => Some(result),
        }
    }

    async fn store(&self, mut record: ImageRecord, bytes: &[u8]) -> ImageRecord {
        let path = self.runs_dir.join(&record.local_path);
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                record.fail(format!("Cannot create {}: {}", parent.display(), e));
                return record;
            }
        }

        match write_atomic(&path, bytes).await {
            Ok(()) => {
                tracing::debug!("Saved {} ({} bytes)", record.local_path, bytes.len());
                record.size_bytes = bytes.len() as u64;
                record.status = DownloadStatus::Downloaded;
                record.error = None;
            }
            Err(e) => record.fail(e),
        }

        record
    }
}
