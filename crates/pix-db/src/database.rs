//! Connection pool and repository accessors.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::DbResult;
use crate::gallery::GalleryRepository;
use crate::job::JobRepository;
use crate::media::MediaRepository;
use crate::publication::PublicationRepository;

/// Shared handle to the PostgreSQL pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect with the configured pool limits.
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "Connected to PostgreSQL database"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run embedded migrations.
    pub async fn migrate(&self) -> DbResult<()> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn media(&self) -> MediaRepository {
        MediaRepository::new(self.pool.clone())
    }

    pub fn galleries(&self) -> GalleryRepository {
        GalleryRepository::new(self.pool.clone())
    }

    pub fn publications(&self) -> PublicationRepository {
        PublicationRepository::new(self.pool.clone())
    }

    pub fn jobs(&self) -> JobRepository {
        JobRepository::new(self.pool.clone())
    }
}
