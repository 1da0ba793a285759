use crate::state::ImageRecord;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Where an already downloaded asset lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupEntry {
    /// Path relative to the `crawl_runs` directory
    pub local_path: String,
    pub size_bytes: u64,
}

/// Assets downloaded by prior runs and by the current one, keyed by original URL
///
/// The index only gates downloads. An entry is honoured only while its file
/// still exists with a non-zero size.
#[derive(Debug, Clone)]
pub struct DedupIndex {
    base_dir: PathBuf,
    entries: HashMap<String, DedupEntry>,
}

impl DedupIndex {
    /// Creates an empty index for assets stored under `base_dir` (the `crawl_runs` directory)
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            entries: HashMap::new(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds or replaces the entry for `url`
    pub fn insert(&mut self, url: impl Into<String>, entry: DedupEntry) {
        self.entries.insert(url.into(), entry);
    }

    /// Indexes a record whose asset is on disk
    ///
    /// Returns false, leaving the index untouched, for pending, failed and
    /// cancelled records and for empty assets.
    pub fn record(&mut self, record: &ImageRecord) -> bool {
        if !record.status.has_asset() || record.size_bytes == 0 || record.local_path.is_empty() {
            return false;
        }

        self.insert(
            record.original_url.clone(),
            DedupEntry {
                local_path: record.local_path.clone(),
                size_bytes: record.size_bytes,
            },
        );
        true
    }

    /// Returns the entry for `url` without touching the filesystem
    pub fn get(&self, url: &str) -> Option<&DedupEntry> {
        self.entries.get(url)
    }

    /// Absolute path of an asset given its `local_path`
    pub fn absolute_path(&self, local_path: &str) -> PathBuf {
        self.base_dir.join(local_path)
    }

    /// Returns the entry for `url` if its file still exists with a non-zero size
    ///
    /// The size reported is the one found on disk.
    pub async fn find_existing(&self, url: &str) -> Option<DedupEntry> {
        let entry = self.entries.get(url)?;
        let metadata = tokio::fs::metadata(self.absolute_path(&entry.local_path))
            .await
            .ok()?;

        if !metadata.is_file() || metadata.len() == 0 {
            return None;
        }

        Some(DedupEntry {
            local_path: entry.local_path.clone(),
            size_bytes: metadata.len(),
        })
    }
}
