//! Storage configuration.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::error::{StorageError, StorageResult};
use crate::fs::FsStore;
use crate::s3::S3Store;
use crate::store::DynStore;

/// Configuration for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Custom endpoint (R2, MinIO); AWS when unset
    pub endpoint_url: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub region: String,
    pub force_path_style: bool,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let endpoint_url = std::env::var("S3_ENDPOINT_URL").ok().filter(|s| !s.is_empty());
        Ok(Self {
            force_path_style: std::env::var("S3_FORCE_PATH_STYLE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(endpoint_url.is_some()),
            endpoint_url,
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("S3_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("S3_BUCKET_NAME not set"))?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// Which backend to use.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Fs { root: PathBuf },
    S3(S3Config),
}

impl StorageConfig {
    /// Read `STORAGE_BACKEND` (`fs` or `s3`, default `fs`) and the backend's settings.
    pub fn from_env() -> StorageResult<Self> {
        let backend = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "fs".to_string());
        match backend.to_ascii_lowercase().as_str() {
            "fs" | "local" => Ok(StorageConfig::Fs {
                root: std::env::var("STORAGE_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./data/objects")),
            }),
            "s3" => Ok(StorageConfig::S3(S3Config::from_env()?)),
            other => Err(StorageError::config_error(format!(
                "unknown STORAGE_BACKEND: {other}"
            ))),
        }
    }

    /// Build the configured store.
    pub async fn connect(self) -> StorageResult<DynStore> {
        match self {
            StorageConfig::Fs { root } => {
                info!("Using filesystem storage at {}", root.display());
                Ok(Arc::new(FsStore::new(root).await?))
            }
            StorageConfig::S3(config) => {
                info!("Using S3 storage bucket {}", config.bucket_name);
                Ok(Arc::new(S3Store::new(config)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_config_connects() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = StorageConfig::Fs {
            root: dir.path().join("objects"),
        }
        .connect()
        .await
        .unwrap();
        assert_eq!(store.backend(), "fs");
        store.check_connectivity().await.unwrap();
    }
}
