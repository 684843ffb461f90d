use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::error::StorageError;
use crate::storage::BlobStorage;

const MAX_CONFLICT_SUFFIX: u32 = 1000;

/// Blob storage rooted at the media directory. Stored paths are relative to
/// the root and always use `/` separators.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Joins `relative` onto the root, rejecting anything that could leave it.
    fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(relative);
        if relative.is_empty()
            || !rel
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(StorageError::InvalidPath(relative.to_string()));
        }
        Ok(self.root.join(rel))
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Creates `filename` inside `dir` without ever overwriting; on conflict
    /// tries `name_2.ext`, `name_3.ext`, ...
    fn create_exclusive(
        &self,
        dir: &Path,
        filename: &str,
        content: &[u8],
    ) -> Result<String, StorageError> {
        let (base, ext) = match filename.rfind('.') {
            Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
            _ => (filename, ""),
        };

        for counter in 1..=MAX_CONFLICT_SUFFIX {
            let candidate = if counter == 1 {
                filename.to_string()
            } else {
                format!("{}_{}{}", base, counter, ext)
            };
            let path = dir.join(&candidate);

            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    file.write_all(content)
                        .map_err(|e| StorageError::WriteFile {
                            path: path.clone(),
                            source: e,
                        })?;
                    return Ok(candidate);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StorageError::WriteFile { path, source: e }),
            }
        }

        Err(StorageError::FileExists(dir.join(filename)))
    }
}

impl BlobStorage for FileStorage {
    fn root(&self) -> &Path {
        &self.root
    }

    fn save_uploaded_file(
        &self,
        content: &[u8],
        suggested_name: &str,
        subfolder: &str,
    ) -> Result<String, StorageError> {
        let subfolder = subfolder.trim_matches('/');
        let dir = self.resolve(subfolder)?;
        self.ensure_directory(&dir)?;

        let filename = sanitize_filename(suggested_name);
        let stored = self.create_exclusive(&dir, &filename, content)?;

        log::debug!("Stored upload {}/{}", subfolder, stored);
        Ok(format!("{}/{}", subfolder, stored))
    }

    fn write_file(&self, relative_path: &str, content: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(relative_path)?;
        if let Some(parent) = path.parent() {
            self.ensure_directory(parent)?;
        }
        std::fs::write(&path, content).map_err(|e| StorageError::WriteFile { path, source: e })
    }

    fn read_file(&self, relative_path: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(relative_path)?;
        std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path)
            } else {
                StorageError::ReadFile { path, source: e }
            }
        })
    }

    fn exists(&self, relative_path: &str) -> bool {
        self.resolve(relative_path)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    fn absolute_path(&self, relative_path: &str) -> Result<PathBuf, StorageError> {
        self.resolve(relative_path)
    }
}

/// Reduces an uploaded file name to a safe single path component.
pub fn sanitize_filename(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileStorage) {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        (dir, storage)
    }

    #[test]
    fn test_save_uploaded_file() {
        let (dir, storage) = setup();

        let rel = storage
            .save_uploaded_file(b"# hi", "post.md", "uploads/markdown")
            .unwrap();

        assert_eq!(rel, "uploads/markdown/post.md");
        assert_eq!(
            std::fs::read(dir.path().join("uploads/markdown/post.md")).unwrap(),
            b"# hi"
        );
    }

    #[test]
    fn test_conflict_gets_suffix() {
        let (_dir, storage) = setup();

        let first = storage.save_uploaded_file(b"1", "a.png", "imgs").unwrap();
        let second = storage.save_uploaded_file(b"2", "a.png", "imgs").unwrap();
        let third = storage.save_uploaded_file(b"3", "a.png", "imgs").unwrap();

        assert_eq!(first, "imgs/a.png");
        assert_eq!(second, "imgs/a_2.png");
        assert_eq!(third, "imgs/a_3.png");
        assert_eq!(storage.read_file(&first).unwrap(), b"1");
        assert_eq!(storage.read_file(&third).unwrap(), b"3");
    }

    #[test]
    fn test_suggested_name_is_sanitized() {
        let (_dir, storage) = setup();

        let rel = storage
            .save_uploaded_file(b"x", "../../etc/pass wd", "uploads")
            .unwrap();
        assert_eq!(rel, "uploads/pass_wd");
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let (_dir, storage) = setup();

        assert!(matches!(
            storage.write_file("../outside.txt", b"x"),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            storage.read_file("/etc/hosts"),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            storage.save_uploaded_file(b"x", "a", "../up"),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(!storage.exists("../x"));
    }

    #[test]
    fn test_write_then_read() {
        let (_dir, storage) = setup();

        storage.write_file("previews/job.html", b"<html/>").unwrap();
        assert!(storage.exists("previews/job.html"));
        assert_eq!(storage.read_file("previews/job.html").unwrap(), b"<html/>");

        storage.write_file("previews/job.html", b"<p/>").unwrap();
        assert_eq!(storage.read_file("previews/job.html").unwrap(), b"<p/>");
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let (_dir, storage) = setup();
        assert!(matches!(
            storage.read_file("nope.txt"),
            Err(StorageError::NotFound(_))
        ));
        assert!(!storage.exists("nope.txt"));
    }

    #[test]
    fn test_absolute_path() {
        let (dir, storage) = setup();
        assert_eq!(
            storage.absolute_path("a/b.jpg").unwrap(),
            dir.path().join("a/b.jpg")
        );
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("photo 1.jpg"), "photo_1.jpg");
        assert_eq!(sanitize_filename("C:\\Users\\me\\pic.png"), "pic.png");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename("../"), "upload");
        assert_eq!(sanitize_filename("封面.jpg"), "封面.jpg");
    }
}
