//! Video transcoding with a poster frame.

use pix_media::{
    generate_thumbnail, image_dimensions, probe_video, transcode, FfmpegProgress, FfmpegRunner,
};
use pix_media::transcode::expected_duration_secs;
use pix_models::{
    JobKind, JobResult, MediaId, MediaItem, MediaKind, TranscodeRequest, TranscodeResult,
};
use pix_storage::keys::derived_key;

use super::{
    derived_filename, download, load_media, require_kind, scratch_dir, store_output,
    store_output_file,
};
use crate::context::{scale_progress, JobProgress, WorkerContext};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Share of the progress bar covered by the ffmpeg run.
const ENCODE_START: u8 = 10;
const ENCODE_END: u8 = 85;

fn encode_progress(p: &FfmpegProgress, total_ms: i64) -> u8 {
    scale_progress(ENCODE_START, ENCODE_END, p.percent(total_ms) as usize, 100)
}

pub(super) async fn run(
    ctx: &WorkerContext,
    owner_id: &str,
    req: &TranscodeRequest,
    progress: &JobProgress,
) -> WorkerResult<JobResult> {
    let logger = JobLogger::new(progress.job_id(), JobKind::Transcode);

    let source = load_media(ctx, owner_id, &req.media_id).await?;
    require_kind(&source, MediaKind::Video)?;

    let dir = scratch_dir(ctx, "transcode-")?;
    let input = dir.path().join(format!("input.{}", source.extension()));
    let ext = req.preset.extension();
    let output = dir.path().join(format!("output.{ext}"));
    download(ctx, &source, &input).await?;
    progress.report(5).await;

    let permit = ctx
        .ffmpeg_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| WorkerError::processing_failed("ffmpeg semaphore closed"))?;

    let source_meta = probe_video(&input).await?;
    let total_ms = (expected_duration_secs(req.preset, source_meta.duration_secs) * 1000.0) as i64;
    logger.started(&format!(
        "{:?} from {}x{} {:.1}s {}",
        req.preset, source_meta.width, source_meta.height, source_meta.duration_secs, source_meta.codec
    ));
    progress.report(ENCODE_START).await;

    let tx = progress.sender();
    let runner = FfmpegRunner::new().with_timeout(ctx.config.job_timeout.as_secs());
    transcode(&input, &output, req.preset, req.max_width, &runner, move |p| {
        let _ = tx.send(encode_progress(&p, total_ms));
    })
    .await?;

    let out_meta = probe_video(&output).await?;
    let poster_path = dir.path().join("poster.jpg");
    let poster = match generate_thumbnail(&output, &poster_path, out_meta.duration_secs).await {
        Ok(()) => tokio::fs::read(&poster_path).await.ok(),
        Err(e) => {
            logger.warning(&format!("Poster extraction failed: {e}"));
            None
        }
    };
    drop(permit);
    progress.report(ENCODE_END).await;

    let size_bytes = tokio::fs::metadata(&output).await?.len();
    let id = MediaId::new();
    let item = MediaItem::new(
        owner_id,
        MediaKind::Video,
        derived_filename(&source.filename, "transcoded", ext),
        req.preset.content_type(),
        derived_key(owner_id, &id, ext),
        size_bytes as i64,
    )
    .with_id(id)
    .with_dimensions(out_meta.width, out_meta.height)
    .with_duration(out_meta.duration_secs)
    .with_source(source.id.clone());
    let item = store_output_file(ctx, item, &output).await?;
    progress.report(92).await;

    let poster_media_id = match poster {
        Some(data) => store_poster(ctx, owner_id, &item, data, &logger).await,
        None => None,
    };
    progress.report(97).await;

    Ok(JobResult::Transcode(TranscodeResult {
        media_id: item.id,
        duration_secs: out_meta.duration_secs,
        width: out_meta.width,
        height: out_meta.height,
        size_bytes,
        poster_media_id,
    }))
}

/// Store the poster as an image derived from the transcoded video. Failures
/// only cost the poster.
async fn store_poster(
    ctx: &WorkerContext,
    owner_id: &str,
    video: &MediaItem,
    data: Vec<u8>,
    logger: &JobLogger,
) -> Option<MediaId> {
    let id = MediaId::new();
    let mut item = MediaItem::new(
        owner_id,
        MediaKind::Image,
        derived_filename(&video.filename, "poster", "jpg"),
        "image/jpeg",
        derived_key(owner_id, &id, "jpg"),
        data.len() as i64,
    )
    .with_id(id)
    .with_source(video.id.clone());
    if let Ok((w, h)) = image_dimensions(&data) {
        item = item.with_dimensions(w, h);
    }

    match store_output(ctx, item, data).await {
        Ok(item) => Some(item.id),
        Err(e) => {
            logger.warning(&format!("Failed to store poster: {e}"));
            None
        }
    }
}
