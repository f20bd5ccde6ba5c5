//! Job handlers, one per job kind.
//!
//! A handler loads its source media, runs the pipeline and stores every output
//! as a new derived `MediaItem` before returning the `JobResult`.

mod resize;
mod smart_crop;
mod transcode;
mod video_metadata;
mod zip;

use std::path::Path;

use pix_db::DbError;
use pix_media::MediaResult;
use pix_models::{Job, JobRequest, JobResult, MediaId, MediaItem, MediaKind};
use pix_storage::StorageError;
use tempfile::TempDir;
use tracing::warn;

use crate::context::{JobProgress, WorkerContext};
use crate::error::{WorkerError, WorkerResult};
use crate::retry::{retry_async, RetryConfig};

/// Run the handler for the job's kind.
pub async fn dispatch(
    ctx: &WorkerContext,
    job: &Job,
    progress: &JobProgress,
) -> WorkerResult<JobResult> {
    let owner = job.owner_id.as_str();
    match &job.request {
        JobRequest::SmartCrop(req) => smart_crop::run(ctx, owner, req, progress).await,
        JobRequest::Resize(req) => resize::run(ctx, owner, req, progress).await,
        JobRequest::Zip(req) => zip::run(ctx, owner, &job.id, req, progress).await,
        JobRequest::Transcode(req) => transcode::run(ctx, owner, req, progress).await,
        JobRequest::VideoMetadata(req) => video_metadata::run(ctx, owner, req, progress).await,
    }
}

/// Fetch a source item. A missing item is the caller's mistake, not a
/// transient failure.
pub(crate) async fn load_media(
    ctx: &WorkerContext,
    owner_id: &str,
    media_id: &MediaId,
) -> WorkerResult<MediaItem> {
    match ctx.db.media().get(owner_id, media_id).await {
        Ok(item) => Ok(item),
        Err(DbError::NotFound(_)) => Err(WorkerError::invalid_input(format!(
            "media {media_id} not found"
        ))),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn require_kind(item: &MediaItem, kind: MediaKind) -> WorkerResult<()> {
    if item.kind != kind {
        return Err(WorkerError::invalid_input(format!(
            "media {} is {}, expected {}",
            item.id, item.kind, kind
        )));
    }
    Ok(())
}

/// Download an item's bytes.
pub(crate) async fn load_bytes(ctx: &WorkerContext, item: &MediaItem) -> WorkerResult<Vec<u8>> {
    match ctx.store.get_bytes(&item.storage_key).await {
        Ok(data) => Ok(data),
        Err(StorageError::NotFound(_)) => Err(WorkerError::invalid_input(format!(
            "file for media {} is missing",
            item.id
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Download an item into `path`.
pub(crate) async fn download(
    ctx: &WorkerContext,
    item: &MediaItem,
    path: &Path,
) -> WorkerResult<()> {
    match ctx.store.get_to_file(&item.storage_key, path).await {
        Ok(()) => Ok(()),
        Err(StorageError::NotFound(_)) => Err(WorkerError::invalid_input(format!(
            "file for media {} is missing",
            item.id
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Scratch directory under the worker's work dir, removed on drop.
pub(crate) fn scratch_dir(ctx: &WorkerContext, prefix: &str) -> WorkerResult<TempDir> {
    Ok(tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(&ctx.config.work_dir)?)
}

/// Run CPU-bound media work off the async runtime.
pub(crate) async fn run_blocking<T, F>(f: F) -> WorkerResult<T>
where
    F: FnOnce() -> MediaResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WorkerError::processing_failed(format!("media task aborted: {e}")))?
        .map_err(WorkerError::from)
}

/// Upload an output and record it as a media item.
pub(crate) async fn store_output(
    ctx: &WorkerContext,
    item: MediaItem,
    data: Vec<u8>,
) -> WorkerResult<MediaItem> {
    let store = &ctx.store;
    retry_async(&RetryConfig::new("store_output"), || {
        store.put_bytes(&item.storage_key, data.clone(), &item.content_type)
    })
    .await?;

    record_output(ctx, item).await
}

/// Upload an output file and record it as a media item.
pub(crate) async fn store_output_file(
    ctx: &WorkerContext,
    item: MediaItem,
    path: &Path,
) -> WorkerResult<MediaItem> {
    let store = &ctx.store;
    retry_async(&RetryConfig::new("store_output_file"), || {
        store.put_file(&item.storage_key, path, &item.content_type)
    })
    .await?;

    record_output(ctx, item).await
}

async fn record_output(ctx: &WorkerContext, item: MediaItem) -> WorkerResult<MediaItem> {
    let media = ctx.db.media();
    let inserted = retry_async(&RetryConfig::new("record_output"), || media.insert(&item)).await;

    if let Err(e) = inserted {
        // Do not leave an object nothing points at.
        if let Err(cleanup) = ctx.store.delete(&item.storage_key).await {
            warn!(key = %item.storage_key, "Failed to remove orphaned output: {}", cleanup);
        }
        return Err(e.into());
    }
    Ok(item)
}

/// `holiday.jpg` + `crop-100x100` + `webp` -> `holiday-crop-100x100.webp`
pub(crate) fn derived_filename(source: &str, suffix: &str, ext: &str) -> String {
    let stem = match source.rfind('.') {
        Some(i) if i > 0 => &source[..i],
        _ => source,
    };
    let stem = if stem.is_empty() { "media" } else { stem };
    format!("{stem}-{suffix}.{ext}")
}
