use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use exif::{In, Reader, Tag, Value};
use serde_json::json;

/// Camera metadata block for the verbose probe report.
///
/// Returns None when the file has no readable EXIF container; a photo
/// without EXIF is unremarkable and never an error.
pub fn exif_summary(path: &Path) -> Option<serde_json::Value> {
    let file = File::open(path).ok()?;
    let mut buf_reader = BufReader::new(file);

    let exif = Reader::new().read_from_container(&mut buf_reader).ok()?;

    let mut summary = json!({});

    if let Some(field) = exif.get_field(Tag::Make, In::PRIMARY) {
        summary["make"] = json!(field.display_value().with_unit(&exif).to_string());
    }
    if let Some(field) = exif.get_field(Tag::Model, In::PRIMARY) {
        summary["model"] = json!(field.display_value().with_unit(&exif).to_string());
    }
    if let Some(field) = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY) {
        summary["date_time_original"] = json!(field.display_value().with_unit(&exif).to_string());
    }
    if let Some(field) = exif.get_field(Tag::Orientation, In::PRIMARY) {
        if let Value::Short(v) = &field.value {
            if let Some(orientation) = v.first() {
                summary["orientation"] = json!(orientation);
            }
        }
    }
    if let Some(field) = exif.get_field(Tag::PhotographicSensitivity, In::PRIMARY) {
        match &field.value {
            Value::Short(v) => {
                if let Some(iso) = v.first() {
                    summary["iso"] = json!(iso);
                }
            }
            Value::Long(v) => {
                if let Some(iso) = v.first() {
                    summary["iso"] = json!(iso);
                }
            }
            _ => {}
        }
    }
    if let Some(field) = exif.get_field(Tag::ExposureTime, In::PRIMARY) {
        summary["exposure_time"] = json!(field.display_value().with_unit(&exif).to_string());
    }

    Some(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    #[test]
    fn test_summary_absent_without_exif() {
        let dir = std::env::temp_dir().join("shoebox_exif_test");
        std::fs::create_dir_all(&dir).unwrap();

        // A synthetic PNG carries no EXIF container.
        let path = dir.join("plain.png");
        RgbImage::new(4, 4).save_with_format(&path, ImageFormat::Png).unwrap();
        assert!(exif_summary(&path).is_none());

        // Missing files are also just "no metadata".
        assert!(exif_summary(&dir.join("nope.jpg")).is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
