//! Local filesystem backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::keys::validate_key;
use crate::store::{ObjectStore, StoredObject};

/// Object store rooted at a local directory.
///
/// Writes go to a temporary sibling and are renamed into place, so readers
/// never observe a partially written object.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create the store, creating `root` if needed.
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    async fn write_atomic(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension(format!("tmp-{}", tmp_suffix()));
        tokio::fs::write(&tmp, data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

fn tmp_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    format!("{}-{}", std::process::id(), nanos)
}

#[async_trait]
impl ObjectStore for FsStore {
    fn backend(&self) -> &'static str {
        "fs"
    }

    async fn put_bytes(&self, key: &str, data: Vec<u8>, _content_type: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        debug!("Writing {} bytes to {}", data.len(), path.display());
        self.write_atomic(&path, &data).await
    }

    async fn put_file(&self, key: &str, src: &Path, _content_type: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension(format!("tmp-{}", tmp_suffix()));
        tokio::fs::copy(src, &tmp).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!("Copied {} to {}", src.display(), path.display());
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<StoredObject> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(StoredObject {
                data,
                content_type: None,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::delete_failed(e.to_string())),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        let meta = tokio::fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(StorageError::config_error(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path()).await.unwrap();

        store
            .put_bytes("users/u1/originals/a.jpg", b"abc".to_vec(), "image/jpeg")
            .await
            .unwrap();
        assert!(store.exists("users/u1/originals/a.jpg").await.unwrap());
        assert_eq!(store.get_bytes("users/u1/originals/a.jpg").await.unwrap(), b"abc");

        store.delete("users/u1/originals/a.jpg").await.unwrap();
        assert!(!store.exists("users/u1/originals/a.jpg").await.unwrap());
        // Deleting twice is fine
        store.delete("users/u1/originals/a.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path()).await.unwrap();
        let err = store.get_bytes("users/u1/none.jpg").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path()).await.unwrap();
        let err = store
            .put_bytes("../outside.txt", b"x".to_vec(), "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_put_file_and_get_to_file() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path().join("objects")).await.unwrap();

        let src = dir.path().join("src.bin");
        tokio::fs::write(&src, b"payload").await.unwrap();
        store
            .put_file("users/u1/derived/x.bin", &src, "application/octet-stream")
            .await
            .unwrap();

        let dst = dir.path().join("out/nested/x.bin");
        store.get_to_file("users/u1/derived/x.bin", &dst).await.unwrap();
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"payload");
        store.check_connectivity().await.unwrap();
    }
}
