use std::path::Path;

use crate::error::CoreError;

/// Content checksum of a file, hex-encoded.
pub fn compute_checksum(path: &Path) -> Result<String, CoreError> {
    let bytes = std::fs::read(path)?;
    Ok(checksum_bytes(&bytes))
}

pub fn checksum_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_stable_and_content_sensitive() {
        let a = checksum_bytes(b"same bytes");
        let b = checksum_bytes(b"same bytes");
        let c = checksum_bytes(b"other bytes");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_compute_checksum_matches_bytes() {
        let dir = std::env::temp_dir().join("shoebox_hash_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("payload.bin");
        std::fs::write(&path, b"payload").unwrap();

        assert_eq!(compute_checksum(&path).unwrap(), checksum_bytes(b"payload"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
