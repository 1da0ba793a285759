//! Crawl state shared between the crawler and the run store
//!
//! # Components
//!
//! - `ImageRecord`: one ledger entry, from discovery to download outcome
//! - `DownloadStatus`: the outcome of an image's download attempt
//! - `Category`: one entry of the gallery's category control
//! - `DedupIndex`: assets already on disk, keyed by original URL

mod category;
mod dedup_index;
mod image_record;

// Re-export main types
pub use category::Category;
pub use dedup_index::{DedupEntry, DedupIndex};
pub use image_record::{DownloadStatus, ImageRecord};
