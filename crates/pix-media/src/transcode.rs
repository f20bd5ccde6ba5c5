//! Video transcoding presets.

use std::path::Path;

use pix_models::encoding::{
    DEFAULT_AUDIO_BITRATE, DEFAULT_AUDIO_CODEC, DEFAULT_CRF, DEFAULT_PRESET, DEFAULT_VIDEO_CODEC,
    PREVIEW_DURATION_SECS,
};
use pix_models::TranscodePreset;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::progress::FfmpegProgress;

/// Scale filter capping width while keeping an even height.
///
/// `min(iw,N)` leaves narrower sources at their own width.
pub fn scale_filter(max_width: u32) -> String {
    let even = max_width - (max_width % 2);
    format!("scale='min(iw,{})':-2", even.max(2))
}

/// Build the FFmpeg command for a preset.
pub fn build_transcode_command(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    preset: TranscodePreset,
    max_width: Option<u32>,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(input, output);

    let max_width = match preset {
        // Previews are small regardless of the request
        TranscodePreset::Preview => Some(max_width.unwrap_or(480).min(480)),
        _ => max_width,
    };
    if let Some(w) = max_width {
        cmd = cmd.video_filter(scale_filter(w));
    }

    match preset {
        TranscodePreset::WebMp4 => cmd
            .video_codec(DEFAULT_VIDEO_CODEC)
            .preset(DEFAULT_PRESET)
            .crf(DEFAULT_CRF)
            .output_args(["-pix_fmt", "yuv420p"])
            .audio_codec(DEFAULT_AUDIO_CODEC)
            .audio_bitrate(DEFAULT_AUDIO_BITRATE)
            .output_args(["-movflags", "+faststart"]),
        TranscodePreset::WebWebm => cmd
            .video_codec("libvpx-vp9")
            .crf(32)
            .output_args(["-b:v", "0", "-row-mt", "1"])
            .audio_codec("libopus")
            .audio_bitrate("96k"),
        TranscodePreset::Preview => cmd
            .duration(PREVIEW_DURATION_SECS)
            .video_codec(DEFAULT_VIDEO_CODEC)
            .preset("veryfast")
            .crf(30)
            .output_args(["-pix_fmt", "yuv420p"])
            .no_audio()
            .output_args(["-movflags", "+faststart"]),
    }
}

/// Expected output duration, for progress reporting.
pub fn expected_duration_secs(preset: TranscodePreset, source_duration_secs: f64) -> f64 {
    match preset {
        TranscodePreset::Preview => source_duration_secs.min(PREVIEW_DURATION_SECS),
        _ => source_duration_secs,
    }
}

/// Transcode `input` into `output` with the given preset.
pub async fn transcode<F>(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    preset: TranscodePreset,
    max_width: Option<u32>,
    runner: &FfmpegRunner,
    on_progress: F,
) -> MediaResult<()>
where
    F: Fn(FfmpegProgress) + Send + 'static,
{
    let cmd = build_transcode_command(input, output, preset, max_width);
    runner.run_with_progress(&cmd, on_progress).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg_after(args: &[String], flag: &str) -> String {
        let i = args.iter().position(|a| a == flag).unwrap();
        args[i + 1].clone()
    }

    #[test]
    fn test_scale_filter_even() {
        assert_eq!(scale_filter(1280), "scale='min(iw,1280)':-2");
        assert_eq!(scale_filter(641), "scale='min(iw,640)':-2");
    }

    #[test]
    fn test_web_mp4_args() {
        let args = build_transcode_command("in.mov", "out.mp4", TranscodePreset::WebMp4, None)
            .build_args();
        assert_eq!(arg_after(&args, "-c:v"), "libx264");
        assert_eq!(arg_after(&args, "-c:a"), "aac");
        assert_eq!(arg_after(&args, "-movflags"), "+faststart");
        assert!(!args.contains(&"-vf".to_string()));
    }

    #[test]
    fn test_webm_args() {
        let args = build_transcode_command("in.mp4", "out.webm", TranscodePreset::WebWebm, Some(720))
            .build_args();
        assert_eq!(arg_after(&args, "-c:v"), "libvpx-vp9");
        assert_eq!(arg_after(&args, "-c:a"), "libopus");
        assert_eq!(arg_after(&args, "-vf"), "scale='min(iw,720)':-2");
    }

    #[test]
    fn test_preview_is_short_and_silent() {
        let args = build_transcode_command("in.mp4", "out.mp4", TranscodePreset::Preview, Some(1920))
            .build_args();
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(arg_after(&args, "-t"), "10.000");
        assert_eq!(arg_after(&args, "-vf"), "scale='min(iw,480)':-2");
        assert_eq!(expected_duration_secs(TranscodePreset::Preview, 60.0), 10.0);
        assert_eq!(expected_duration_secs(TranscodePreset::Preview, 4.0), 4.0);
    }
}
