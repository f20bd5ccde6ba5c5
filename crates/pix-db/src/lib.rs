//! PostgreSQL persistence for Pixvault.
//!
//! One repository per aggregate, all sharing the pool held by [`Database`].
//! Every query is owner-scoped except the worker-facing job transitions and
//! the scheduler's [`PublicationRepository::publish_due`].

pub mod config;
pub mod database;
pub mod error;
pub mod gallery;
pub mod job;
pub mod media;
pub mod publication;

pub use config::DatabaseConfig;
pub use database::Database;
pub use error::{DbError, DbResult};
pub use gallery::{GalleryRepository, GalleryUpdate};
pub use job::{JobRepository, STALE_JOB_ERROR};
pub use media::MediaRepository;
pub use publication::PublicationRepository;
