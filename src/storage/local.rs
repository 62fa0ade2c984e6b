//! Directory-backed object store for offline runs and tests.

use super::{ObjectStore, StorageError};
use async_trait::async_trait;
use reqwest::Url;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Stores each object as a file below `root`; nested names map to sub-directories.
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    /// Create a store rooted at `root`. The directory is created on first upload.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the objects.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        name.split('/')
            .filter(|segment| !segment.is_empty() && *segment != "..")
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl ObjectStore for LocalDirStore {
    async fn upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let path = self.path_for(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;
        }
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(io_error(&path))?;

        let absolute = std::path::absolute(&path).map_err(io_error(&path))?;
        let url = Url::from_file_path(&absolute)
            .map_err(|()| StorageError::InvalidUrl(absolute.display().to_string()))?;
        tracing::info!(path = %path.display(), size = bytes.len(), "Stored object locally");
        Ok(url.to_string())
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|err| StorageError::Io {
                path: self.root.clone(),
                source: err.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                let name = relative
                    .components()
                    .map(|component| component.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                names.push(name);
            }
        }
        Ok(names)
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(name);
        tokio::fs::read(&path).await.map_err(io_error(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_list_download_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalDirStore::new(dir.path().join("knowledge-base"));

        assert!(store.list().await.expect("empty list").is_empty());

        let url = store
            .upload("2024/tasks.xlsx", b"sheet".to_vec(), "application/octet-stream")
            .await
            .expect("upload");
        store
            .upload("notes.json", b"[]".to_vec(), "application/json")
            .await
            .expect("upload");

        assert!(url.starts_with("file://"));
        assert!(url.ends_with("/knowledge-base/2024/tasks.xlsx"));
        assert_eq!(
            store.list().await.expect("list"),
            vec!["2024/tasks.xlsx", "notes.json"]
        );
        assert_eq!(
            store.download("2024/tasks.xlsx").await.expect("download"),
            b"sheet"
        );
    }

    #[tokio::test]
    async fn upload_overwrites_existing_object() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalDirStore::new(dir.path());
        store.upload("a.pdf", b"v1".to_vec(), "application/pdf").await.expect("v1");
        store.upload("a.pdf", b"v2".to_vec(), "application/pdf").await.expect("v2");
        assert_eq!(store.download("a.pdf").await.expect("download"), b"v2");
    }

    #[tokio::test]
    async fn parent_segments_stay_inside_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalDirStore::new(dir.path().join("inner"));
        store
            .upload("../escape.txt", b"x".to_vec(), "text/plain")
            .await
            .expect("upload");
        assert!(dir.path().join("inner/escape.txt").exists());
        assert!(!dir.path().join("escape.txt").exists());
    }
}
