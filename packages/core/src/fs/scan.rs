use std::path::Path;

use walkdir::WalkDir;

use crate::error::CoreError;
use crate::mime::{self, MimeType};
use crate::pool;
use crate::types::ScannedFile;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// 0 walks the whole tree, 1 stays in the top level.
    pub recursion_depth: u32,
    pub ignore_dotfiles: bool,
    pub allowed_types: Vec<MimeType>,
    /// Concurrent MIME classifications. File-descriptor bound, keep small.
    pub classify_jobs: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursion_depth: 0,
            ignore_dotfiles: true,
            allowed_types: vec![
                MimeType::new("image", "jpeg"),
                MimeType::new("image", "png"),
                MimeType::new("image", "tiff"),
            ],
            classify_jobs: 3,
        }
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Walks `root` and returns every file whose content classifies into the
/// allow-set. Output is sorted by path; callers must not rely on ordering.
///
/// Per-file classification errors are tolerated (the file is skipped), a
/// failing walk step surfaces as the scan's error.
pub fn scan_directory(root: &Path, options: &ScanOptions) -> Result<Vec<ScannedFile>, CoreError> {
    let mut walker = WalkDir::new(root);
    if options.recursion_depth == 1 {
        walker = walker.max_depth(1);
    }

    let ignore_dotfiles = options.ignore_dotfiles;
    let mut candidates = Vec::new();
    for entry in walker
        .into_iter()
        .filter_entry(move |e| e.depth() == 0 || !ignore_dotfiles || !is_hidden(e))
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        // Stability filter: zero-length files are still being written or broken.
        if entry.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
            continue;
        }
        candidates.push(entry.into_path());
    }

    let allowed = options.allowed_types.clone();
    let classified = pool::run_parallel(candidates, options.classify_jobs, |path| {
        match mime::classify_file(&path) {
            Ok(Some(m)) if mime::is_admissible(&m, &allowed) => Some(ScannedFile {
                format: m.format_name(),
                path,
            }),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("skipping unclassifiable file {}: {}", path.display(), e);
                None
            }
        }
    });

    let mut found: Vec<ScannedFile> = classified.into_iter().flatten().collect();
    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::fs;

    fn write_png(path: &Path) {
        RgbImage::new(6, 6).save_with_format(path, ImageFormat::Png).unwrap();
    }

    #[test]
    fn test_scan_admits_by_content_only() {
        let dir = std::env::temp_dir().join("shoebox_scan_content");
        if dir.exists() {
            fs::remove_dir_all(&dir).unwrap();
        }
        fs::create_dir_all(&dir).unwrap();

        write_png(&dir.join("real.png"));
        // PNG content behind a misleading extension is still admitted.
        write_png(&dir.join("actually_png.dat"));
        // Text behind an image extension is not.
        fs::write(dir.join("fake.jpg"), b"not an image at all").unwrap();
        fs::write(dir.join("notes.txt"), b"plain words").unwrap();
        // Zero-length files are filtered before classification.
        fs::File::create(dir.join("empty.png")).unwrap();

        let found = scan_directory(&dir, &ScanOptions::default()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|f| f.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();

        assert_eq!(names, vec!["actually_png.dat", "real.png"]);
        assert!(found.iter().all(|f| f.format == "PNG"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_scan_depth_and_dotfiles() {
        let dir = std::env::temp_dir().join("shoebox_scan_depth");
        if dir.exists() {
            fs::remove_dir_all(&dir).unwrap();
        }
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::create_dir_all(dir.join(".hidden_dir")).unwrap();

        write_png(&dir.join("top.png"));
        write_png(&dir.join("nested").join("deep.png"));
        write_png(&dir.join(".hidden.png"));
        write_png(&dir.join(".hidden_dir").join("buried.png"));

        let full = scan_directory(&dir, &ScanOptions::default()).unwrap();
        assert_eq!(full.len(), 2); // top.png + nested/deep.png

        let single = scan_directory(
            &dir,
            &ScanOptions {
                recursion_depth: 1,
                ..ScanOptions::default()
            },
        )
        .unwrap();
        assert_eq!(single.len(), 1);
        assert!(single[0].path.ends_with("top.png"));

        let with_hidden = scan_directory(
            &dir,
            &ScanOptions {
                ignore_dotfiles: false,
                ..ScanOptions::default()
            },
        )
        .unwrap();
        assert_eq!(with_hidden.len(), 4);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_scan_missing_root_is_an_error() {
        let dir = std::env::temp_dir().join("shoebox_scan_no_such_dir");
        let result = scan_directory(&dir, &ScanOptions::default());
        assert!(result.is_err());
    }
}
