//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::handler::Handler;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::compression::CompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::files::serve_signed_file;
use crate::handlers::galleries::{
    add_gallery_items, create_gallery, delete_gallery, get_gallery, list_galleries,
    remove_gallery_item, reorder_gallery_items, update_gallery,
};
use crate::handlers::jobs::{create_job, get_job, list_jobs, retry_job};
use crate::handlers::media::{
    create_media_link, delete_media, get_media, get_media_file, list_media, upload_media,
};
use crate::handlers::publications::{
    create_publication, delete_publication, get_publication, list_publications,
    publish_publication, schedule_publication, unschedule_publication,
};
use crate::handlers::{health, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Public signed-link rate: 5 req/sec, burst 10.
const FILE_LINK_RPS: u32 = 5;
const FILE_LINK_BURST: u32 = 10;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let upload_limit = state.config.max_upload_size + MULTIPART_OVERHEAD;

    let media_routes = Router::new()
        .route(
            "/media",
            get(list_media).post(upload_media.layer(DefaultBodyLimit::max(upload_limit))),
        )
        .route("/media/:id", get(get_media).delete(delete_media))
        .route("/media/:id/file", get(get_media_file))
        .route("/media/:id/link", post(create_media_link));

    let gallery_routes = Router::new()
        .route("/galleries", post(create_gallery).get(list_galleries))
        .route(
            "/galleries/:id",
            get(get_gallery).patch(update_gallery).delete(delete_gallery),
        )
        .route(
            "/galleries/:id/items",
            post(add_gallery_items).put(reorder_gallery_items),
        )
        .route(
            "/galleries/:id/items/:media_id",
            delete(remove_gallery_item),
        );

    let publication_routes = Router::new()
        .route("/publications", post(create_publication).get(list_publications))
        .route(
            "/publications/:id",
            get(get_publication).delete(delete_publication),
        )
        .route(
            "/publications/:id/schedule",
            post(schedule_publication).delete(unschedule_publication),
        )
        .route("/publications/:id/publish", post(publish_publication));

    let job_routes = Router::new()
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/retry", post(retry_job));

    let rate_limiter = Arc::new(RateLimiterCache::new(
        state.config.rate_limit_rps,
        state.config.rate_limit_burst,
    ));

    // Signed links are unauthenticated, so they get a tighter budget.
    let file_rate_limiter = Arc::new(RateLimiterCache::new(FILE_LINK_RPS, FILE_LINK_BURST));

    let api_routes = Router::new()
        .merge(media_routes)
        .merge(gallery_routes)
        .merge(publication_routes)
        .merge(job_routes)
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let file_routes = Router::new()
        .route("/files/:token", get(serve_signed_file))
        .layer(middleware::from_fn_with_state(
            file_rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(file_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Hard cap; per-route extractor limits are tighter.
        .layer(RequestBodyLimitLayer::new(upload_limit))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(request_id))
        .layer(cors_layer(&state.config.cors_origins))
        .layer(CompressionLayer::new())
        .with_state(state)
}
