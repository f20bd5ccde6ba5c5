//! Read stream information from a stored video.

use pix_media::probe_video;
use pix_models::{JobResult, MediaKind, VideoMetadataRequest};

use super::{download, load_media, require_kind, scratch_dir};
use crate::context::{JobProgress, WorkerContext};
use crate::error::WorkerResult;

pub(super) async fn run(
    ctx: &WorkerContext,
    owner_id: &str,
    req: &VideoMetadataRequest,
    progress: &JobProgress,
) -> WorkerResult<JobResult> {
    let source = load_media(ctx, owner_id, &req.media_id).await?;
    require_kind(&source, MediaKind::Video)?;

    let dir = scratch_dir(ctx, "probe-")?;
    let input = dir.path().join(format!("input.{}", source.extension()));
    download(ctx, &source, &input).await?;
    progress.report(50).await;

    let mut metadata = probe_video(&input).await?;
    if metadata.size_bytes == 0 {
        metadata.size_bytes = source.size_bytes.max(0) as u64;
    }
    progress.report(90).await;

    Ok(JobResult::VideoMetadata(metadata))
}
