//! Content digests used as media cache keys.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

const CHUNK_SIZE: usize = 64 * 1024;

/// Computes SHA-256 digests of files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHasher;

impl ContentHasher {
    pub fn new() -> Self {
        Self
    }

    /// Returns the lowercase hex SHA-256 of the file, or `None` if it cannot
    /// be read. Callers treat `None` as "skip the cache", never as a failure.
    pub fn hash(&self, path: &Path) -> Option<String> {
        match hash_file(path) {
            Ok(digest) => Some(digest),
            Err(e) => {
                log::warn!(
                    "Could not hash {}: {}",
                    crate::sanitize::redact_path(path),
                    e
                );
                None
            }
        }
    }
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
