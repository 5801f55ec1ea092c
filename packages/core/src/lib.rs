pub mod config;
pub mod error;
pub mod types;

pub mod fs;
pub mod image;
pub mod metadata;
pub mod mime;
pub mod pool;

pub use config::EngineConfig;
pub use error::CoreError;
pub use types::{
    format_filesize, new_object_id, BatchStatus, Doc, Image, ImageWithVariants, ImportBatch,
    ScannedFile, Size, VariantSpec,
};

pub use fs::{scan_directory, ScanOptions};
pub use image::{checksum_bytes, compute_checksum, ImageProbe, MediaProbe, ProbeOutput, ResizeRequest};
pub use mime::MimeType;
