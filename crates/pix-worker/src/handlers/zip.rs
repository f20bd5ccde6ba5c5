//! Bundle media into a zip archive.

use pix_db::DbError;
use pix_media::{create_zip, ArchiveEntry};
use pix_models::encoding::{sanitize_archive_name, MAX_ARCHIVE_ENTRIES};
use pix_models::{JobId, JobResult, MediaId, MediaItem, MediaKind, ZipRequest, ZipResult, ZipSource};
use pix_storage::keys::archive_key;

use super::{load_bytes, run_blocking, store_output};
use crate::context::{scale_progress, JobProgress, WorkerContext};
use crate::error::{WorkerError, WorkerResult};

const ZIP_CONTENT_TYPE: &str = "application/zip";

/// The items to archive and the name the archive gets when none was requested.
async fn resolve_source(
    ctx: &WorkerContext,
    owner_id: &str,
    job_id: &JobId,
    source: &ZipSource,
) -> WorkerResult<(Vec<MediaItem>, String)> {
    let (ids, fallback_name) = match source {
        ZipSource::Media { media_ids } => (media_ids.clone(), format!("media-{job_id}")),
        ZipSource::Gallery { gallery_id } => {
            let galleries = ctx.db.galleries();
            let gallery = galleries.get(owner_id, gallery_id).await.map_err(missing)?;
            let items = galleries.items(owner_id, gallery_id).await.map_err(missing)?;
            (items.into_iter().map(|i| i.media_id).collect(), gallery.name)
        }
        ZipSource::Publication { publication_id } => {
            let publication = ctx
                .db
                .publications()
                .get(owner_id, publication_id)
                .await
                .map_err(missing)?;
            (
                publication.items.into_iter().map(|i| i.media_id).collect(),
                publication.title,
            )
        }
    };

    check_entry_count(ids.len())?;
    let items = ctx.db.media().get_many(owner_id, &ids).await.map_err(missing)?;
    reject_archives(&items)?;
    Ok((items, fallback_name))
}

/// Archives only come out of zip jobs; they do not go back in.
fn reject_archives(items: &[MediaItem]) -> WorkerResult<()> {
    match items.iter().find(|item| item.kind == MediaKind::Archive) {
        Some(item) => Err(WorkerError::invalid_input(format!(
            "{} is an archive and cannot be zipped again",
            item.id
        ))),
        None => Ok(()),
    }
}

fn missing(err: DbError) -> WorkerError {
    match err {
        DbError::NotFound(what) => WorkerError::invalid_input(format!("{what} not found")),
        other => other.into(),
    }
}

fn check_entry_count(count: usize) -> WorkerResult<()> {
    if count == 0 {
        return Err(WorkerError::invalid_input("nothing to archive"));
    }
    if count > MAX_ARCHIVE_ENTRIES {
        return Err(WorkerError::invalid_input(format!(
            "archive would have {count} entries, limit is {MAX_ARCHIVE_ENTRIES}"
        )));
    }
    Ok(())
}

/// `<name>.zip`, using the requested name when it survives sanitizing.
fn archive_filename(requested: Option<&str>, fallback: &str) -> String {
    let stem = requested
        .and_then(sanitize_archive_name)
        .or_else(|| sanitize_archive_name(fallback))
        .unwrap_or_else(|| "archive".to_string());
    format!("{stem}.zip")
}

pub(super) async fn run(
    ctx: &WorkerContext,
    owner_id: &str,
    job_id: &JobId,
    req: &ZipRequest,
    progress: &JobProgress,
) -> WorkerResult<JobResult> {
    let (items, fallback_name) = resolve_source(ctx, owner_id, job_id, &req.source).await?;
    progress.report(5).await;

    let total = items.len();
    let mut entries = Vec::with_capacity(total);
    for (i, item) in items.iter().enumerate() {
        let data = load_bytes(ctx, item).await?;
        entries.push(ArchiveEntry::new(item.filename.clone(), data));
        progress.report(scale_progress(5, 80, i + 1, total)).await;
    }

    let data = run_blocking(move || create_zip(&entries)).await?;
    progress.report(85).await;

    let filename = archive_filename(req.archive_name.as_deref(), &fallback_name);
    let id = MediaId::new();
    let size_bytes = data.len() as u64;
    let item = MediaItem::new(
        owner_id,
        MediaKind::Archive,
        filename.clone(),
        ZIP_CONTENT_TYPE,
        archive_key(owner_id, &id),
        size_bytes as i64,
    )
    .with_id(id);

    let item = store_output(ctx, item, data).await?;
    progress.report(95).await;

    Ok(JobResult::Zip(ZipResult {
        media_id: item.id,
        filename,
        entries: total as u32,
        size_bytes,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_filename() {
        assert_eq!(archive_filename(Some("Summer 2024"), "x"), "Summer 2024.zip");
        assert_eq!(archive_filename(Some("trip.zip"), "x"), "trip.zip");
        assert_eq!(archive_filename(None, "Wedding"), "Wedding.zip");
        assert_eq!(archive_filename(Some("///"), "Wedding"), "___.zip");
        assert_eq!(archive_filename(Some("..."), "Wedding"), "Wedding.zip");
        assert_eq!(archive_filename(None, "  "), "archive.zip");
    }

    #[test]
    fn test_entry_count_limits() {
        assert!(matches!(check_entry_count(0), Err(WorkerError::InvalidInput(_))));
        assert!(check_entry_count(1).is_ok());
        assert!(check_entry_count(MAX_ARCHIVE_ENTRIES).is_ok());
        assert!(check_entry_count(MAX_ARCHIVE_ENTRIES + 1).is_err());
    }

    #[test]
    fn test_missing_maps_to_invalid_input() {
        let err = missing(DbError::not_found("gallery gal-1"));
        assert!(matches!(err, WorkerError::InvalidInput(ref m) if m.contains("gal-1")));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_archives_are_not_zip_sources() {
        let photo = MediaItem::new("user-1", MediaKind::Image, "a.jpg", "image/jpeg", "k/a.jpg", 10);
        let bundle = MediaItem::new("user-1", MediaKind::Archive, "b.zip", ZIP_CONTENT_TYPE, "k/b.zip", 10);

        assert!(reject_archives(std::slice::from_ref(&photo)).is_ok());
        let err = reject_archives(&[photo, bundle.clone()]).unwrap_err();
        assert!(matches!(err, WorkerError::InvalidInput(ref m) if m.contains(bundle.id.as_str())));
    }
}
