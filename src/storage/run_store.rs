use crate::state::{DedupIndex, ImageRecord};
use crate::storage::{
    Run, RunManifest, StorageError, StorageResult, CRAWL_RUNS_DIR, LEDGER_FILE, MANIFEST_FILE,
};
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Highest `_NN` suffix tried when several runs start within the same second
const MAX_RUN_SUFFIX: u32 = 99;

/// Manages the `crawl_runs` directory of a crawl root
#[derive(Debug, Clone)]
pub struct RunStore {
    runs_dir: PathBuf,
}

impl RunStore {
    pub fn new(crawl_root: impl AsRef<Path>) -> Self {
        Self {
            runs_dir: crawl_root.as_ref().join(CRAWL_RUNS_DIR),
        }
    }

    /// The `crawl_runs` directory; record `local_path`s are relative to it
    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    pub fn run_directory(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(run_id)
    }

    /// Allocates a new run directory and writes its `running` manifest
    ///
    /// The run id is the current UTC time as `YYYYMMDD_HHMMSS`. If a run with
    /// that id exists, `_01`, `_02`, ... are appended.
    pub async fn create_run(&self, config_hash: &str) -> StorageResult<Run> {
        tokio::fs::create_dir_all(&self.runs_dir)
            .await
            .map_err(|e| StorageError::io(&self.runs_dir, e))?;

        let base = Utc::now().format("%Y%m%d_%H%M%S").to_string();

        for suffix in 0..=MAX_RUN_SUFFIX {
            let run_id = if suffix == 0 {
                base.clone()
            } else {
                format!("{}_{:02}", base, suffix)
            };
            let root = self.run_directory(&run_id);

            match tokio::fs::create_dir(&root).await {
                Ok(()) => {
                    tracing::info!("Created run {} at {}", run_id, root.display());
                    return Run::start(run_id, root, config_hash).await;
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StorageError::io(&root, e)),
            }
        }

        Err(StorageError::io(
            &self.runs_dir,
            std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("no free run id for {}", base),
            ),
        ))
    }

    /// Lists run ids in creation order
    ///
    /// A missing `crawl_runs` directory means no runs.
    pub async fn list_runs(&self) -> StorageResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.runs_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.runs_dir, e)),
        };

        let mut runs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.runs_dir, e))?
        {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if !path.join(MANIFEST_FILE).exists() && !path.join(LEDGER_FILE).exists() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                runs.push(name.to_string());
            }
        }

        runs.sort();
        Ok(runs)
    }

    /// Returns the most recently created run, if any
    pub async fn latest_run(&self) -> StorageResult<Option<String>> {
        Ok(self.list_runs().await?.pop())
    }

    /// Loads a run's ledger
    ///
    /// A run that has not flushed yet has an empty ledger.
    pub async fn load_ledger(&self, run_id: &str) -> StorageResult<Vec<ImageRecord>> {
        let root = self.run_directory(run_id);
        if !root.is_dir() {
            return Err(StorageError::RunNotFound(run_id.to_string()));
        }

        let path = root.join(LEDGER_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        serde_json::from_slice(&bytes).map_err(|e| StorageError::json(&path, e))
    }

    /// Loads a run's manifest
    pub async fn load_manifest(&self, run_id: &str) -> StorageResult<RunManifest> {
        let path = self.run_directory(run_id).join(MANIFEST_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::RunNotFound(run_id.to_string()))
            }
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        serde_json::from_slice(&bytes).map_err(|e| StorageError::json(&path, e))
    }

    /// Builds the dedup index from every run's ledger, oldest first
    ///
    /// Only records whose asset was written (`downloaded` or
    /// `already_present`) are indexed, so later runs win for a URL seen
    /// twice. An unreadable ledger is skipped with a warning.
    pub async fn build_dedup_index(&self) -> StorageResult<DedupIndex> {
        let mut index = DedupIndex::new(&self.runs_dir);

        for run_id in self.list_runs().await? {
            let records = match self.load_ledger(&run_id).await {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!("Skipping ledger of run {}: {}", run_id, e);
                    continue;
                }
            };

            let indexed = records.iter().filter(|r| index.record(r)).count();
            tracing::debug!("Indexed {} assets from run {}", indexed, run_id);
        }

        tracing::info!("Dedup index holds {} known assets", index.len());
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CrawlSummary;
    use crate::state::DownloadStatus;
    use crate::storage::RunStatus;

    fn record(url: &str, local_path: &str, status: DownloadStatus) -> ImageRecord {
        let mut record = ImageRecord::discovered(url, "a.jpg", "https://g.example.com/", "");
        record.local_path = local_path.to_string();
        record.status = status;
        record.size_bytes = if status.has_asset() { 4 } else { 0 };
        record
    }

    #[tokio::test]
    async fn test_create_run_same_second_gets_suffix() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = RunStore::new(dir.path());

        let first = store.create_run("h").await.unwrap();
        let second = store.create_run("h").await.unwrap();
        assert_ne!(first.run_id(), second.run_id());
        assert!(first.root_directory().starts_with(store.runs_dir()));
        assert!(first.root_directory().join(MANIFEST_FILE).exists());

        let runs = store.list_runs().await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0], first.run_id());
        assert_eq!(
            store.latest_run().await.unwrap().as_deref(),
            Some(second.run_id())
        );
    }

    #[test]
    fn test_run_ids_sort_in_creation_order() {
        let mut ids = vec![
            "20240101_120001".to_string(),
            "20240101_120000_01".to_string(),
            "20240101_120000".to_string(),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec!["20240101_120000", "20240101_120000_01", "20240101_120001"]
        );
    }

    #[tokio::test]
    async fn test_list_runs_without_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = RunStore::new(dir.path().join("missing"));
        assert!(store.list_runs().await.unwrap().is_empty());
        assert!(store.latest_run().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_unknown_run() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = RunStore::new(dir.path());
        assert!(matches!(
            store.load_ledger("20990101_000000").await,
            Err(StorageError::RunNotFound(_))
        ));
        assert!(matches!(
            store.load_manifest("20990101_000000").await,
            Err(StorageError::RunNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_build_dedup_index_from_ledgers() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = RunStore::new(dir.path());

        let mut run = store.create_run("h").await.unwrap();
        let run_id = run.run_id().to_string();
        run.append_records(vec![
            record(
                "https://g.example.com/images/1/a.jpg",
                &format!("{}/images/1/a.jpg", run_id),
                DownloadStatus::Downloaded,
            ),
            record(
                "https://g.example.com/images/1/b.jpg",
                &format!("{}/images/1/b.jpg", run_id),
                DownloadStatus::Failed,
            ),
        ]);
        run.finalize(RunStatus::Completed, &CrawlSummary::new(&run_id), false)
            .await
            .unwrap();

        let index = store.build_dedup_index().await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(
            index
                .get("https://g.example.com/images/1/a.jpg")
                .map(|e| e.local_path.clone()),
            Some(format!("{}/images/1/a.jpg", run_id))
        );
        assert_eq!(index.base_dir(), store.runs_dir());

        let manifest = store.load_manifest(&run_id).await.unwrap();
        assert_eq!(manifest.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_corrupt_ledger_is_skipped() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = RunStore::new(dir.path());
        let run = store.create_run("h").await.unwrap();
        std::fs::write(run.root_directory().join(LEDGER_FILE), b"{not json").unwrap();

        let index = store.build_dedup_index().await.unwrap();
        assert!(index.is_empty());
        assert!(matches!(
            store.load_ledger(run.run_id()).await,
            Err(StorageError::Json { .. })
        ));
    }
}
