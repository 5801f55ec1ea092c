pub mod exif;

pub use exif::exif_summary;
