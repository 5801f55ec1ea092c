use std::fmt;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A two-part MIME tag, e.g. `image/jpeg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MimeType {
    pub top: String,
    pub sub: String,
}

impl MimeType {
    pub fn new(top: &str, sub: &str) -> Self {
        Self {
            top: top.to_string(),
            sub: sub.to_string(),
        }
    }

    /// Canonical format name for image subtypes (`jpeg` becomes `JPEG`).
    pub fn format_name(&self) -> String {
        self.sub.to_uppercase()
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.top, self.sub)
    }
}

/// Parses a `top/sub` string. Returns None for anything else.
pub fn parse_mime(raw: &str) -> Option<MimeType> {
    let (top, sub) = raw.split_once('/')?;
    if top.is_empty() || sub.is_empty() || sub.contains('/') {
        return None;
    }
    Some(MimeType::new(top, sub))
}

// Longest magic number we need to see. RIFF containers carry their subtype
// at offset 8.
const SNIFF_LEN: usize = 12;

/// Classifies a byte prefix by content. Extension is never consulted.
pub fn sniff_bytes(bytes: &[u8]) -> Option<MimeType> {
    if bytes.len() >= 3 && bytes[..3] == [0xFF, 0xD8, 0xFF] {
        return Some(MimeType::new("image", "jpeg"));
    }
    if bytes.len() >= 8 && bytes[..8] == [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A] {
        return Some(MimeType::new("image", "png"));
    }
    if bytes.len() >= 4 && (bytes[..4] == [0x49, 0x49, 0x2A, 0x00] || bytes[..4] == [0x4D, 0x4D, 0x00, 0x2A]) {
        return Some(MimeType::new("image", "tiff"));
    }
    if bytes.len() >= 6 && (&bytes[..6] == b"GIF87a" || &bytes[..6] == b"GIF89a") {
        return Some(MimeType::new("image", "gif"));
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some(MimeType::new("image", "webp"));
    }
    if bytes.len() >= 2 && &bytes[..2] == b"BM" {
        return Some(MimeType::new("image", "bmp"));
    }
    None
}

/// Classifies a file by reading its leading bytes.
/// Returns Ok(None) when the content matches no known signature.
pub fn classify_file(path: &Path) -> Result<Option<MimeType>, CoreError> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = [0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < SNIFF_LEN {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(sniff_bytes(&buf[..filled]))
}

/// Admissibility against a configured allow-set.
pub fn is_admissible(mime: &MimeType, allowed: &[MimeType]) -> bool {
    allowed.iter().any(|a| a == mime)
}
