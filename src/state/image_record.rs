//! Image records as stored in a run's `metadata.json`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of the download step for one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Extracted, not yet handed to the downloader
    #[default]
    Pending,

    /// Fetched and written by this run
    Downloaded,

    /// Reused from an earlier download, no request made
    AlreadyPresent,

    /// All attempts failed
    Failed,

    /// The crawl was cancelled before the image was fetched
    Cancelled,
}

impl DownloadStatus {
    /// Returns true if the asset exists on disk at the record's `local_path`
    pub fn has_asset(&self) -> bool {
        matches!(self, Self::Downloaded | Self::AlreadyPresent)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloaded => "downloaded",
            Self::AlreadyPresent => "already_present",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata for one gallery image
///
/// `original_url` is unique within one run's ledger. `local_path` is relative
/// to the `crawl_runs` directory so that records of later runs can point at
/// assets of earlier ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub original_url: String,
    pub local_path: String,
    pub filename: String,
    pub size_bytes: u64,
    pub alt_text: String,
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub category_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
    pub score: f64,
    pub source_page: String,
    pub page_title: String,
    pub crawl_run: String,
    pub found_at: DateTime<Utc>,
    #[serde(default)]
    pub status: DownloadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageRecord {
    /// Creates a pending record for an image found on `source_page`
    ///
    /// Category, run and local path are filled in by the coordinator.
    pub fn discovered(
        original_url: impl Into<String>,
        filename: impl Into<String>,
        source_page: impl Into<String>,
        page_title: impl Into<String>,
    ) -> Self {
        Self {
            original_url: original_url.into(),
            local_path: String::new(),
            filename: filename.into(),
            size_bytes: 0,
            alt_text: String::new(),
            title: String::new(),
            description: String::new(),
            category: String::new(),
            category_label: String::new(),
            dimensions: None,
            score: 0.0,
            source_page: source_page.into(),
            page_title: page_title.into(),
            crawl_run: String::new(),
            found_at: Utc::now(),
            status: DownloadStatus::Pending,
            error: None,
        }
    }

    /// Marks the record as failed with the given error message
    pub fn fail(&mut self, error: impl fmt::Display) {
        self.status = DownloadStatus::Failed;
        self.error = Some(error.to_string());
        self.size_bytes = 0;
    }
}
