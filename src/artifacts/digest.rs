// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Content digests for artifact addressing
//!
//! Uses BLAKE3 for fast, secure content hashing.

use blake3::Hasher;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::errors::{ShiplineError, ShiplineResult};

/// Hex digest of a byte payload
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize().to_hex().to_string()
}

/// Hex digest of a file's contents, streamed rather than read whole
pub fn digest_file(path: &Path) -> ShiplineResult<String> {
    let read_error = |e: std::io::Error| ShiplineError::FileReadError {
        path: path.to_path_buf(),
        error: e.to_string(),
    };
    let file = File::open(path).map_err(read_error)?;
    let mut hasher = Hasher::new();
    hasher.update_reader(file).map_err(read_error)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Location of a digest under `root`
///
/// The first two characters fan out into a directory to keep listings small.
pub fn content_path(root: &Path, digest: &str) -> PathBuf {
    let (prefix, rest) = digest.split_at(2.min(digest.len()));
    root.join(prefix).join(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(digest_bytes(b"hello"), digest_bytes(b"hello"));
        assert_ne!(digest_bytes(b"hello"), digest_bytes(b"world"));
        assert_eq!(digest_bytes(b"").len(), 64);
    }

    #[test]
    fn test_content_path_fans_out() {
        let path = content_path(Path::new("/store"), "abcdef");
        assert_eq!(path, PathBuf::from("/store/ab/cdef"));
    }

    #[test]
    fn test_digest_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        std::fs::write(&path, b"binary").unwrap();
        assert_eq!(digest_file(&path).unwrap(), digest_bytes(b"binary"));
    }
}
