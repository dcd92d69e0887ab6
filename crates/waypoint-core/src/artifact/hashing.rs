//! Partial fingerprints for checkpoint files.
//!
//! Only a fixed-size prefix of the artifact is hashed. This keeps the cost
//! independent of checkpoint size, at the price of missing any change that
//! lies entirely past the window.

use crate::config::ArtifactConfig;
use crate::error::{Result, WaypointError};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// SHA256 over the first [`ArtifactConfig::FINGERPRINT_WINDOW`] bytes.
///
/// Returned as a lowercase hex string.
pub fn compute_partial_fingerprint(path: impl AsRef<Path>) -> Result<String> {
    compute_prefix_hash(path, ArtifactConfig::FINGERPRINT_WINDOW)
}

/// SHA256 over at most `window` leading bytes of a file.
pub fn compute_prefix_hash(path: impl AsRef<Path>, window: usize) -> Result<String> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| WaypointError::io_with_path(e, path))?;

    let mut hasher = Sha256::new();
    let mut limited = file.take(window as u64);
    let mut buffer = vec![0u8; window.min(ArtifactConfig::READ_CHUNK_SIZE).max(1)];

    loop {
        let bytes_read = limited
            .read(&mut buffer)
            .map_err(|e| WaypointError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let hash = compute_partial_fingerprint(file.path()).unwrap();

        // SHA256 of empty input
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_changes_past_window_are_invisible() {
        let mut a = NamedTempFile::new().unwrap();
        a.write_all(b"0123456789abcdef").unwrap();
        a.flush().unwrap();

        let mut b = NamedTempFile::new().unwrap();
        b.write_all(b"0123456789ABCDEF").unwrap();
        b.flush().unwrap();

        assert_eq!(
            compute_prefix_hash(a.path(), 10).unwrap(),
            compute_prefix_hash(b.path(), 10).unwrap()
        );
        assert_ne!(
            compute_prefix_hash(a.path(), 11).unwrap(),
            compute_prefix_hash(b.path(), 11).unwrap()
        );
    }

    #[test]
    fn test_small_file_hashes_whole_content() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        file.flush().unwrap();

        assert_eq!(
            compute_partial_fingerprint(file.path()).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = compute_partial_fingerprint("/definitely/not/here");
        assert!(matches!(result, Err(WaypointError::Io { .. })));
    }
}
