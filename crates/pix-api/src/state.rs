//! Application state.

use std::sync::Arc;

use anyhow::Context;

use pix_db::{Database, DatabaseConfig};
use pix_queue::{JobQueue, ProgressChannel};
use pix_storage::{DynStore, StorageConfig};

use crate::auth::JwtVerifier;
use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub db: Database,
    pub store: DynStore,
    pub queue: Arc<JobQueue>,
    pub progress: Arc<ProgressChannel>,
    pub jwt: Arc<JwtVerifier>,
}

impl AppState {
    /// Connect every backend from the environment.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let db = Database::connect(&DatabaseConfig::from_env()?)
            .await
            .context("connecting to Postgres")?;
        let store = StorageConfig::from_env()?
            .connect()
            .await
            .context("opening object storage")?;
        let queue = JobQueue::from_env()?;
        let progress = ProgressChannel::new(&queue.config().redis_url)?;

        Ok(Self::from_parts(config, db, store, queue, progress))
    }

    pub fn from_parts(
        config: ApiConfig,
        db: Database,
        store: DynStore,
        queue: JobQueue,
        progress: ProgressChannel,
    ) -> Self {
        let jwt = JwtVerifier::new(&config.jwt_secret);
        Self {
            config: Arc::new(config),
            db,
            store,
            queue: Arc::new(queue),
            progress: Arc::new(progress),
            jwt: Arc::new(jwt),
        }
    }
}
