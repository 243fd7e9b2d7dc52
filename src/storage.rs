//! Persisting generated PDFs under the output directory.
//!
//! Writes are atomic (temp file in the same directory, then rename), so a
//! concurrent reader of `/files/<name>` sees either the previous PDF or the
//! new one, never a partial file. Two requests for the same theme write the
//! same name; the later rename wins.

use crate::error::ColoringError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Owner of the output directory.
#[derive(Debug, Clone)]
pub struct StorageService {
    root: PathBuf,
}

impl StorageService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `coloring_<theme>.pdf`, with spaces turned into underscores and the
    /// theme lower-cased.
    pub fn build_filename(theme: &str) -> String {
        format!("coloring_{}.pdf", theme.replace(' ', "_").to_lowercase())
    }

    /// Public URL of `filename` under `prefix` (e.g. `/files`).
    pub fn pdf_url(prefix: &str, filename: &str) -> String {
        format!("{}/{}", prefix.trim_end_matches('/'), filename)
    }

    /// Atomically write `bytes` to `<root>/<filename>` and return the path.
    pub async fn save_pdf(&self, filename: &str, bytes: Vec<u8>) -> Result<PathBuf, ColoringError> {
        let path = self.root.join(filename);
        if filename.is_empty() || filename.contains(['/', '\\']) || filename.starts_with('.') {
            return Err(ColoringError::StorageFailed {
                path,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "file name must be a plain name inside the output directory",
                ),
            });
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ColoringError::StorageFailed {
                path: self.root.clone(),
                source: e,
            })?;

        let root = self.root.clone();
        let target = path.clone();
        let len = bytes.len();
        tokio::task::spawn_blocking(move || write_atomic(&root, &target, &bytes))
            .await
            .map_err(|e| ColoringError::Internal(format!("storage task failed: {e}")))??;

        info!("Saved {} ({} bytes)", path.display(), len);
        Ok(path)
    }
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), ColoringError> {
    let failed = |source: std::io::Error| ColoringError::StorageFailed {
        path: target.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(failed)?;
    tmp.write_all(bytes).map_err(failed)?;
    tmp.flush().map_err(failed)?;
    debug!("Renaming {} → {}", tmp.path().display(), target.display());
    tmp.persist(target).map_err(|e| failed(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_from_theme() {
        assert_eq!(StorageService::build_filename("animals"), "coloring_animals.pdf");
        assert_eq!(
            StorageService::build_filename("Sea Creatures"),
            "coloring_sea_creatures.pdf"
        );
    }

    #[test]
    fn url_joins_prefix() {
        assert_eq!(StorageService::pdf_url("/files", "a.pdf"), "/files/a.pdf");
        assert_eq!(StorageService::pdf_url("/files/", "a.pdf"), "/files/a.pdf");
    }

    #[tokio::test]
    async fn save_creates_dir_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageService::new(dir.path().join("nested"));

        let p1 = storage.save_pdf("coloring_animals.pdf", b"first".to_vec()).await.unwrap();
        let p2 = storage.save_pdf("coloring_animals.pdf", b"second".to_vec()).await.unwrap();
        assert_eq!(p1, p2);
        assert_eq!(std::fs::read(&p2).unwrap(), b"second");

        let entries: Vec<_> = std::fs::read_dir(storage.root()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temp files must not linger");
    }

    #[tokio::test]
    async fn rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageService::new(dir.path());
        for bad in ["../x.pdf", "a/b.pdf", "", ".hidden.pdf"] {
            let err = storage.save_pdf(bad, vec![1]).await.unwrap_err();
            assert!(matches!(err, ColoringError::StorageFailed { .. }), "{bad}");
        }
    }
}
