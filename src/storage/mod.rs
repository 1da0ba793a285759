//! Storage module for persisting crawl runs
//!
//! Every crawl gets its own timestamped directory under
//! `{crawl_root}/crawl_runs/`:
//!
//! ```text
//! crawl_runs/
//!   20250301_141502/
//!     run.json        manifest: status, timestamps, config hash, counters
//!     metadata.json   ledger: JSON array of image records
//!     summary.md      human-readable summary
//!     images/{category}/{filename}
//! ```
//!
//! Ledgers of earlier runs are only ever read, to build the dedup index.

mod run;
mod run_store;

pub use run::Run;
pub use run_store::RunStore;

use crate::output::CrawlSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory under the crawl root holding all runs
pub const CRAWL_RUNS_DIR: &str = "crawl_runs";
/// Ledger file of a run
pub const LEDGER_FILE: &str = "metadata.json";
/// Manifest file of a run
pub const MANIFEST_FILE: &str = "run.json";
/// Markdown summary of a run
pub const SUMMARY_FILE: &str = "summary.md";
/// Asset directory of a run
pub const IMAGES_DIR: &str = "images";

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Run not found: {0}")]
    RunNotFound(String),
}

impl StorageError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Contents of a run's `run.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub config_hash: String,
    #[serde(default)]
    pub summary: Option<CrawlSummary>,
}

/// Writes `bytes` to `path` through a temporary sibling file and a rename
///
/// Readers never observe a partially written file.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let mut tmp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| StorageError::io(&tmp_path, e))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| StorageError::io(path, e))?;

    Ok(())
}

/// Serializes `value` as pretty JSON and writes it atomically
pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| StorageError::json(path, e))?;
    write_atomic(path, &json).await
}
