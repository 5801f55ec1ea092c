use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use serde_json::json;

use crate::error::CoreError;
use crate::metadata::exif_summary;
use crate::types::format_filesize;

/// What a probe learned about an image file.
#[derive(Debug, Clone)]
pub struct ProbeOutput {
    /// Canonical format name, e.g. `PNG`.
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub filesize: u64,
    /// Raw probe report, persisted as `metadata_raw`.
    pub raw: serde_json::Value,
}

/// A resize request. One dimension fits preserving aspect ratio, two
/// dimensions resize exactly (and may distort).
#[derive(Debug, Clone)]
pub struct ResizeRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Output format, e.g. `jpg`.
    pub format: String,
}

/// The probe/resize/stream capability set the engine works against.
pub trait MediaProbe: Send + Sync {
    /// Inspects a file without decoding pixel data. `verbose` adds the
    /// camera metadata block to the raw report.
    fn probe(&self, path: &Path, verbose: bool) -> Result<ProbeOutput, CoreError>;

    /// Decodes, resizes and writes `source` to `dest`.
    fn resize(&self, source: &Path, request: &ResizeRequest, dest: &Path) -> Result<PathBuf, CoreError>;

    /// Reads a file fully into memory so the bytes can be consumed more
    /// than once (checksum, then upload).
    fn open_stream(&self, path: &Path) -> Result<Vec<u8>, CoreError>;
}

/// In-process probe backed by the `image` crate.
#[derive(Debug, Default, Clone)]
pub struct ImageProbe;

impl ImageProbe {
    pub fn new() -> Self {
        Self
    }
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "JPEG".to_string(),
        ImageFormat::Png => "PNG".to_string(),
        ImageFormat::Tiff => "TIFF".to_string(),
        ImageFormat::Gif => "GIF".to_string(),
        ImageFormat::WebP => "WEBP".to_string(),
        ImageFormat::Bmp => "BMP".to_string(),
        other => other
            .extensions_str()
            .first()
            .map(|e| e.to_uppercase())
            .unwrap_or_else(|| "UNKNOWN".to_string()),
    }
}

fn output_format(name: &str) -> Result<ImageFormat, CoreError> {
    match name.to_lowercase().as_str() {
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        "png" => Ok(ImageFormat::Png),
        "tif" | "tiff" => Ok(ImageFormat::Tiff),
        other => Err(CoreError::InvalidInput(format!(
            "unsupported output format {:?}",
            other
        ))),
    }
}

/// Target dimensions for a resize. Exact when both are given, aspect-fit
/// when one is, source size when neither.
fn fit_dimensions(
    orig_width: u32,
    orig_height: u32,
    width: Option<u32>,
    height: Option<u32>,
) -> (u32, u32) {
    match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => {
            let h = (orig_height as f64 * w as f64 / orig_width as f64).round() as u32;
            (w, h.max(1))
        }
        (None, Some(h)) => {
            let w = (orig_width as f64 * h as f64 / orig_height as f64).round() as u32;
            (w.max(1), h)
        }
        (None, None) => (orig_width, orig_height),
    }
}

impl MediaProbe for ImageProbe {
    fn probe(&self, path: &Path, verbose: bool) -> Result<ProbeOutput, CoreError> {
        let reader = image::ImageReader::open(path)?
            .with_guessed_format()
            .map_err(|e| CoreError::Probe(format!("{}: {}", path.display(), e)))?;
        let format = reader
            .format()
            .ok_or_else(|| CoreError::Probe(format!("{}: unrecognized image format", path.display())))?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| CoreError::Probe(format!("{}: {}", path.display(), e)))?;
        let filesize = std::fs::metadata(path)?.len();

        let format = format_name(format);
        let mut raw = json!({
            "format": format,
            "width": width,
            "height": height,
            "filesize": format_filesize(filesize),
            "path": path.to_string_lossy(),
        });
        if verbose {
            if let Some(exif) = exif_summary(path) {
                raw["exif"] = exif;
            }
        }

        Ok(ProbeOutput {
            format,
            width,
            height,
            filesize,
            raw,
        })
    }

    fn resize(&self, source: &Path, request: &ResizeRequest, dest: &Path) -> Result<PathBuf, CoreError> {
        let target_format = output_format(&request.format)?;
        let img = image::open(source)
            .map_err(|e| CoreError::Probe(format!("{}: {}", source.display(), e)))?;

        let (w, h) = fit_dimensions(img.width(), img.height(), request.width, request.height);
        let resized = img.resize_exact(w, h, FilterType::Triangle);

        // The JPEG encoder rejects alpha channels.
        let resized = if target_format == ImageFormat::Jpeg {
            DynamicImage::ImageRgb8(resized.to_rgb8())
        } else {
            resized
        };

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        resized
            .save_with_format(dest, target_format)
            .map_err(|e| CoreError::Probe(format!("{}: {}", dest.display(), e)))?;

        Ok(dest.to_path_buf())
    }

    fn open_stream(&self, path: &Path) -> Result<Vec<u8>, CoreError> {
        Ok(std::fs::read(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::fs;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        if dir.exists() {
            fs::remove_dir_all(&dir).unwrap();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_probe_reports_format_and_dimensions() {
        let dir = test_dir("shoebox_probe_basic");
        let path = dir.join("clooney.png");
        RgbImage::new(480, 599).save_with_format(&path, ImageFormat::Png).unwrap();

        let out = ImageProbe::new().probe(&path, true).unwrap();
        assert_eq!(out.format, "PNG");
        assert_eq!(out.width, 480);
        assert_eq!(out.height, 599);
        assert!(out.filesize > 0);
        assert_eq!(out.raw["format"], "PNG");
        assert_eq!(out.raw["width"], 480);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_probe_failure_on_non_image() {
        let dir = test_dir("shoebox_probe_bad");
        let path = dir.join("junk.png");
        fs::write(&path, b"definitely not pixels").unwrap();

        match ImageProbe::new().probe(&path, false) {
            Err(CoreError::Probe(_)) => (),
            other => panic!("expected probe failure, got {:?}", other),
        }

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_resize_exact_and_aspect_fit() {
        let dir = test_dir("shoebox_probe_resize");
        let src = dir.join("src.png");
        RgbImage::new(100, 50).save_with_format(&src, ImageFormat::Png).unwrap();
        let probe = ImageProbe::new();

        // Both dimensions: exact, may distort.
        let exact = dir.join("exact.jpg");
        probe
            .resize(
                &src,
                &ResizeRequest {
                    width: Some(30),
                    height: Some(30),
                    format: "jpg".into(),
                },
                &exact,
            )
            .unwrap();
        let out = probe.probe(&exact, false).unwrap();
        assert_eq!((out.width, out.height), (30, 30));
        assert_eq!(out.format, "JPEG");

        // One dimension: aspect-preserving fit.
        let fit = dir.join("fit.png");
        probe
            .resize(
                &src,
                &ResizeRequest {
                    width: Some(20),
                    height: None,
                    format: "png".into(),
                },
                &fit,
            )
            .unwrap();
        let out = probe.probe(&fit, false).unwrap();
        assert_eq!((out.width, out.height), (20, 10));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_fit_dimensions_rounding() {
        assert_eq!(fit_dimensions(480, 599, Some(80), None), (80, 100));
        assert_eq!(fit_dimensions(599, 480, None, Some(80)), (100, 80));
        assert_eq!(fit_dimensions(10, 10, None, None), (10, 10));
    }

    #[test]
    fn test_open_stream_buffers_whole_file() {
        let dir = test_dir("shoebox_probe_stream");
        let path = dir.join("blob.bin");
        fs::write(&path, b"abc123").unwrap();

        let probe = ImageProbe::new();
        let first = probe.open_stream(&path).unwrap();
        let second = probe.open_stream(&path).unwrap();
        assert_eq!(first, b"abc123");
        assert_eq!(first, second);

        fs::remove_dir_all(&dir).unwrap();
    }
}
