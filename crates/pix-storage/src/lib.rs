//! Object storage for Pixvault.
//!
//! This crate provides:
//! - The [`ObjectStore`] trait with filesystem and S3-compatible backends
//! - Backend selection from the environment
//! - The object key layout
//! - HMAC-signed file tokens for link sharing

pub mod config;
pub mod delivery;
pub mod error;
pub mod fs;
pub mod keys;
pub mod s3;
pub mod store;

pub use config::{S3Config, StorageConfig};
pub use delivery::{FileScope, FileToken, DEFAULT_EXPIRY_SECS, MAX_EXPIRY_SECS};
pub use error::{StorageError, StorageResult};
pub use fs::FsStore;
pub use s3::S3Store;
pub use store::{DynStore, ObjectStore, StoredObject};
