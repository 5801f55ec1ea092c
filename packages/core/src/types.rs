use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Allocates a new object identifier: a random 128-bit value rendered as a
/// canonical UUID string.
pub fn new_object_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn geometry(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Renders a byte count the way the probe reports it: `"486.3K"`, `"2.1M"`.
/// Sub-kilobyte sizes keep the exact byte count.
pub fn format_filesize(bytes: u64) -> String {
    const K: f64 = 1024.0;
    let b = bytes as f64;
    if b < K {
        format!("{}B", bytes)
    } else if b < K * K {
        format!("{:.1}K", b / K)
    } else if b < K * K * K {
        format!("{:.1}M", b / (K * K))
    } else {
        format!("{:.1}G", b / (K * K * K))
    }
}

/// A catalogued image document. Originals and variants share this shape;
/// a non-empty `original_id` marks a variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    /// Id of the parent original for variants, empty for originals.
    pub original_id: String,
    /// Id of the import batch that produced this image, empty for ad-hoc saves.
    pub batch_id: String,
    /// Source path for originals, derived working path for variants.
    pub path: String,
    /// Filename for originals, rendition name (e.g. `thumbnail.jpg`) for variants.
    pub name: String,
    pub format: String,
    pub geometry: String,
    pub size: Size,
    pub filesize: String,
    pub checksum: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Sorted ascending, duplicate-free at rest.
    pub tags: Vec<String>,
    pub in_trash: bool,
    /// Opaque probe output. Excluded from default projections.
    pub metadata_raw: Option<serde_json::Value>,
}

impl Image {
    pub fn is_variant(&self) -> bool {
        !self.original_id.is_empty()
    }

    /// Sorts and deduplicates `tags` in place, restoring the at-rest invariant.
    pub fn normalize_tags(&mut self) {
        self.tags.sort();
        self.tags.dedup();
    }
}

/// An original together with its variants, ascending by width.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageWithVariants {
    pub image: Image,
    pub variants: Vec<Image>,
}

/// A rendition requested from the import engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantSpec {
    /// Rendition name; doubles as the variant document name and attachment name.
    pub name: String,
    /// Output format, e.g. `jpg` or `png`.
    pub format: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl VariantSpec {
    pub fn new(name: &str, format: &str, width: Option<u32>, height: Option<u32>) -> Self {
        Self {
            name: name.to_string(),
            format: format.to_string(),
            width,
            height,
        }
    }

    /// Approximate output area, used to pick the smallest rendition first.
    /// A one-sided spec is treated as square; an unconstrained spec sorts last.
    pub fn pixel_area(&self) -> u64 {
        match (self.width, self.height) {
            (Some(w), Some(h)) => w as u64 * h as u64,
            (Some(d), None) | (None, Some(d)) => d as u64 * d as u64,
            (None, None) => u64::MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Init,
    Started,
    AbortRequested,
    Aborting,
    Aborted,
    Error,
    Completed,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Aborted | BatchStatus::Error | BatchStatus::Completed
        )
    }
}

/// An import batch document. Work lists and per-image error maps are
/// transient engine state and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: String,
    /// Root directory the batch was scanned from.
    pub path: String,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub num_to_import: u32,
    pub num_attempted: u32,
    pub num_success: u32,
    pub num_error: u32,
    #[serde(default)]
    pub in_trash: bool,
}

impl ImportBatch {
    pub fn new(path: &str, num_to_import: u32) -> Self {
        let now = Utc::now();
        Self {
            id: new_object_id(),
            path: path.to_string(),
            status: BatchStatus::Init,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
            num_to_import,
            num_attempted: 0,
            num_success: 0,
            num_error: 0,
            in_trash: false,
        }
    }
}

/// A persisted document, discriminated by `class_name` at the storage boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "class_name", rename_all = "snake_case")]
pub enum Doc {
    Image(Image),
    ImportBatch(ImportBatch),
}

impl Doc {
    pub fn id(&self) -> &str {
        match self {
            Doc::Image(img) => &img.id,
            Doc::ImportBatch(batch) => &batch.id,
        }
    }

    pub fn as_image(&self) -> Option<&Image> {
        match self {
            Doc::Image(img) => Some(img),
            _ => None,
        }
    }

    pub fn as_batch(&self) -> Option<&ImportBatch> {
        match self {
            Doc::ImportBatch(batch) => Some(batch),
            _ => None,
        }
    }

    pub fn into_image(self) -> Option<Image> {
        match self {
            Doc::Image(img) => Some(img),
            _ => None,
        }
    }

    pub fn into_batch(self) -> Option<ImportBatch> {
        match self {
            Doc::ImportBatch(batch) => Some(batch),
            _ => None,
        }
    }
}

/// A file the directory scanner admitted for import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub format: String,
}
