pub mod filesystem;

use std::path::{Path, PathBuf};

use crate::error::StorageError;

pub use filesystem::{sanitize_filename, FileStorage};

/// Local storage for uploads and generated artifacts. All paths are
/// relative to [`BlobStorage::root`].
pub trait BlobStorage: Send + Sync {
    fn root(&self) -> &Path;

    /// Stores `content` under `subfolder`, never overwriting an existing
    /// file. Returns the stored relative path.
    fn save_uploaded_file(
        &self,
        content: &[u8],
        suggested_name: &str,
        subfolder: &str,
    ) -> Result<String, StorageError>;

    /// Creates or replaces the file at `relative_path`.
    fn write_file(&self, relative_path: &str, content: &[u8]) -> Result<(), StorageError>;

    fn read_file(&self, relative_path: &str) -> Result<Vec<u8>, StorageError>;

    fn exists(&self, relative_path: &str) -> bool;

    fn absolute_path(&self, relative_path: &str) -> Result<PathBuf, StorageError>;
}
