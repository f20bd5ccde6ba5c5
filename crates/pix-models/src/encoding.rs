//! Encoding and limit constants shared by the API and the worker.

/// Largest width or height accepted for any generated image.
pub const MAX_DIMENSION: u32 = 8192;

/// Default JPEG quality for derived images.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Width of video poster frames.
pub const THUMBNAIL_SCALE_WIDTH: u32 = 480;
/// Seek position for video poster frames.
pub const THUMBNAIL_TIMESTAMP: &str = "00:00:01";

/// Default H.264 settings for the `web_mp4` transcode preset.
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
pub const DEFAULT_PRESET: &str = "fast";
pub const DEFAULT_CRF: u8 = 23;
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Length of `preview` transcodes.
pub const PREVIEW_DURATION_SECS: f64 = 10.0;

/// Maximum number of entries in a single zip archive.
pub const MAX_ARCHIVE_ENTRIES: usize = 1000;

/// Maximum length of a user supplied archive name (without extension).
pub const MAX_ARCHIVE_NAME_LEN: usize = 100;

/// Check that a requested dimension is usable.
pub fn is_valid_dimension(value: u32) -> bool {
    (1..=MAX_DIMENSION).contains(&value)
}

/// Reduce a user supplied archive name to a safe file stem.
///
/// Keeps alphanumerics, `-`, `_`, `.` and spaces; everything else becomes `_`.
/// Leading dots are stripped so the result can never be `..` or a hidden file.
pub fn sanitize_archive_name(name: &str) -> Option<String> {
    let stem = name.trim().trim_end_matches(".zip");
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim().to_string();
    if cleaned.is_empty() {
        return None;
    }
    Some(cleaned.chars().take(MAX_ARCHIVE_NAME_LEN).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_bounds() {
        assert!(!is_valid_dimension(0));
        assert!(is_valid_dimension(1));
        assert!(is_valid_dimension(MAX_DIMENSION));
        assert!(!is_valid_dimension(MAX_DIMENSION + 1));
    }

    #[test]
    fn test_sanitize_archive_name() {
        assert_eq!(sanitize_archive_name("Summer 2024.zip").as_deref(), Some("Summer 2024"));
        assert_eq!(sanitize_archive_name("../../etc").as_deref(), Some("_.._etc"));
        assert_eq!(sanitize_archive_name("a/b\\c").as_deref(), Some("a_b_c"));
        assert_eq!(sanitize_archive_name("   "), None);
        assert_eq!(sanitize_archive_name("..."), None);
    }
}
