//! Axum HTTP API server.
//!
//! This crate provides:
//! - Media upload and delivery, galleries and publications
//! - Job submission and status
//! - Bearer JWT authentication, rate limiting and security headers
//! - Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use auth::{issue_token, AuthUser, Claims, JwtVerifier};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::StaleJobDetector;
pub use state::AppState;
