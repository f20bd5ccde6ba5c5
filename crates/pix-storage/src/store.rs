//! Backend-agnostic object store interface.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Metadata returned with a downloaded object.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

/// Minimal object store used by the API and the worker.
///
/// Keys are validated with [`crate::keys::validate_key`] by every backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend name for logs and health output.
    fn backend(&self) -> &'static str;

    async fn put_bytes(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()>;

    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> StorageResult<()>;

    /// Fails with [`crate::StorageError::NotFound`] when the key is absent.
    async fn get(&self, key: &str) -> StorageResult<StoredObject>;

    async fn get_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        Ok(self.get(key).await?.data)
    }

    /// Download an object to a local path, creating parent directories.
    async fn get_to_file(&self, key: &str, path: &Path) -> StorageResult<()> {
        let data = self.get_bytes(key).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    /// Delete an object. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    async fn check_connectivity(&self) -> StorageResult<()>;
}

/// Shared handle to a store.
pub type DynStore = Arc<dyn ObjectStore>;
