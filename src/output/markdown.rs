//! Markdown summary generation
//!
//! This module renders a run manifest and its ledger statistics as the
//! human-readable `summary.md` stored next to the run's ledger.

use crate::output::stats::{display_label, megabytes, LedgerStatistics};
use crate::storage::RunManifest;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown summary of a run to `output_path`
pub fn generate_markdown_summary(
    manifest: &RunManifest,
    stats: &LedgerStatistics,
    output_path: &Path,
) -> std::io::Result<()> {
    let markdown = format_markdown_summary(manifest, stats);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run as markdown
pub fn format_markdown_summary(manifest: &RunManifest, stats: &LedgerStatistics) -> String {
    let mut md = String::new();

    md.push_str("# Gallery-Harvest Crawl Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", manifest.run_id));
    md.push_str(&format!("- **Started**: {}\n", manifest.started_at.to_rfc3339()));
    if let Some(finished) = &manifest.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
        let duration = (*finished - manifest.started_at).num_seconds().max(0);
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", manifest.status));
    md.push_str(&format!("- **Config Hash**: {}\n\n", manifest.config_hash));

    if let Some(summary) = &manifest.summary {
        md.push_str("## Crawl Counters\n\n");
        md.push_str("| Counter | Value |\n");
        md.push_str("|---------|-------|\n");
        md.push_str(&format!(
            "| Categories visited | {} / {} |\n",
            summary.categories_visited, summary.categories_total
        ));
        md.push_str(&format!("| Pages walked | {} |\n", summary.pages_walked));
        md.push_str(&format!("| Pages failed | {} |\n", summary.pages_failed));
        md.push_str(&format!("| Images recorded | {} |\n", summary.images_recorded));
        md.push_str(&format!(
            "| Images downloaded | {} |\n",
            summary.images_downloaded
        ));
        md.push_str(&format!(
            "| Skipped as duplicate | {} |\n",
            summary.images_skipped_duplicate
        ));
        md.push_str(&format!("| Images failed | {} |\n", summary.images_failed));
        md.push_str(&format!(
            "| Duplicates within run | {} |\n",
            summary.duplicates_in_run
        ));
        md.push_str(&format!("| URLs rejected | {} |\n", summary.urls_rejected));
        md.push_str(&format!(
            "| Downloaded | {:.2} MB |\n\n",
            megabytes(summary.bytes_downloaded)
        ));

        let low_confidence: Vec<_> = summary
            .categories
            .iter()
            .filter(|c| c.low_confidence)
            .collect();
        if !low_confidence.is_empty() {
            md.push_str("## Low-Confidence Terminations\n\n");
            md.push_str(
                "These categories ended on a page with no images and no next link. \
                 Their coverage may be incomplete.\n\n",
            );
            for category in low_confidence {
                md.push_str(&format!(
                    "- {} (`{}`), {} pages walked\n",
                    category.label, category.id, category.pages
                ));
            }
            md.push('\n');
        }
    }

    // Ledger statistics
    md.push_str("## Ledger\n\n");
    md.push_str(&format!("- **Images**: {}\n", stats.total_images));
    md.push_str(&format!("- **Total Size**: {:.2} MB\n", stats.total_megabytes()));
    md.push_str(&format!(
        "- **With Description**: {}\n",
        stats.with_description
    ));
    md.push_str(&format!("- **With Dimensions**: {}\n\n", stats.with_dimensions));

    if !stats.by_status.is_empty() {
        md.push_str("| Status | Count |\n");
        md.push_str("|--------|-------|\n");
        for (status, count) in &stats.by_status {
            md.push_str(&format!("| {} | {} |\n", status, count));
        }
        md.push('\n');
    }

    if !stats.categories.is_empty() {
        md.push_str("## Categories\n\n");
        md.push_str("| Category | Id | Images | Size (MB) | Recent files |\n");
        md.push_str("|----------|----|--------|-----------|--------------|\n");
        for category in &stats.categories {
            md.push_str(&format!(
                "| {} | {} | {} | {:.2} | {} |\n",
                escape_cell(display_label(category)),
                escape_cell(&category.id),
                category.images,
                megabytes(category.bytes),
                escape_cell(&category.recent_filenames.join(", "))
            ));
        }
        md.push('\n');
    }

    md.push_str("---\n\n");
    md.push_str(&format!(
        "*Generated by Gallery-Harvest at {}*\n",
        chrono::Utc::now().to_rfc3339()
    ));

    md
}

fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CrawlSummary;
    use crate::output::CategorySummary;
    use crate::state::{DownloadStatus, ImageRecord};
    use crate::storage::RunStatus;
    use chrono::{Duration, Utc};

    fn manifest() -> RunManifest {
        let started_at = Utc::now();
        let mut summary = CrawlSummary::new("20240101_000000");
        summary.categories_total = 2;
        summary.categories_visited = 2;
        summary.images_recorded = 1;
        summary.record_category(CategorySummary {
            id: "7".to_string(),
            label: "Aquarelles".to_string(),
            pages: 3,
            images: 0,
            termination: "empty last page".to_string(),
            low_confidence: true,
        });

        RunManifest {
            run_id: "20240101_000000".to_string(),
            started_at,
            finished_at: Some(started_at + Duration::seconds(90)),
            status: RunStatus::Completed,
            config_hash: "abc123".to_string(),
            summary: Some(summary),
        }
    }

    fn stats() -> LedgerStatistics {
        let mut record = ImageRecord::discovered(
            "https://g.example.com/images/3/a.jpg",
            "a.jpg",
            "https://g.example.com/",
            "",
        );
        record.category = "3".to_string();
        record.category_label = "Huiles | Pastels".to_string();
        record.status = DownloadStatus::Downloaded;
        record.size_bytes = 2048;
        LedgerStatistics::from_records("20240101_000000", &[record])
    }

    #[test]
    fn test_format_contains_sections() {
        let md = format_markdown_summary(&manifest(), &stats());
        assert!(md.contains("# Gallery-Harvest Crawl Summary"));
        assert!(md.contains("- **Run ID**: 20240101_000000"));
        assert!(md.contains("- **Status**: completed"));
        assert!(md.contains("- **Duration**: 90 seconds"));
        assert!(md.contains("- **Config Hash**: abc123"));
        assert!(md.contains("## Low-Confidence Terminations"));
        assert!(md.contains("Aquarelles (`7`)"));
        assert!(md.contains("| downloaded | 1 |"));
        assert!(md.contains("Huiles \\| Pastels"));
    }

    #[test]
    fn test_format_without_summary() {
        let mut manifest = manifest();
        manifest.summary = None;
        manifest.finished_at = None;
        let md = format_markdown_summary(&manifest, &stats());
        assert!(!md.contains("## Crawl Counters"));
        assert!(!md.contains("Duration"));
    }

    #[test]
    fn test_generate_writes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("summary.md");
        generate_markdown_summary(&manifest(), &stats(), &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# Gallery-Harvest Crawl Summary"));
    }
}
