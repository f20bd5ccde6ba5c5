//! Poster frame extraction.

use std::path::Path;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use pix_models::encoding::{THUMBNAIL_SCALE_WIDTH, THUMBNAIL_TIMESTAMP};

fn thumbnail_command(video_path: &Path, output_path: &Path, seek_first: bool) -> FfmpegCommand {
    let cmd = FfmpegCommand::new(video_path, output_path);
    let cmd = if seek_first {
        cmd.input_arg("-ss").input_arg(THUMBNAIL_TIMESTAMP)
    } else {
        cmd
    };
    cmd.single_frame()
        .video_filter(format!("scale='min(iw,{})':-2", THUMBNAIL_SCALE_WIDTH))
        .output_args(["-q:v", "3"])
        .log_level("error")
}

/// Write a JPEG poster frame for a video.
///
/// Videos shorter than the poster timestamp fall back to the first frame.
pub async fn generate_thumbnail(
    video_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    duration_secs: f64,
) -> MediaResult<()> {
    let video_path = video_path.as_ref();
    let output_path = output_path.as_ref();

    let cmd = thumbnail_command(video_path, output_path, duration_secs > 1.0);
    FfmpegRunner::new().with_timeout(60).run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_args() {
        let args = thumbnail_command(Path::new("v.mp4"), Path::new("t.jpg"), true).build_args();
        assert!(args.contains(&"-ss".to_string()));
        assert!(args.iter().any(|a| a.contains("480")));

        let args = thumbnail_command(Path::new("v.mp4"), Path::new("t.jpg"), false).build_args();
        assert!(!args.contains(&"-ss".to_string()));
    }
}
