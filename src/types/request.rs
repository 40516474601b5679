use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use regex::Regex;
use serde::Serialize;

use crate::result::{Error, ErrorKind, Result};

use super::{RangeSelection, VideoMetadata};

/// Everything needed to acquire a video and place it at its destination.
#[derive(Debug, Clone)]
pub struct AcquisitionRequest {
    pub url: String,
    pub quality: String,
    pub selection: RangeSelection,
    /// Record a live stream from its beginning instead of its live edge
    pub live_from_start: bool,
    pub destination: PathBuf,
}

impl AcquisitionRequest {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            quality: crate::config::DEFAULT_QUALITY.to_string(),
            selection: RangeSelection::Full,
            live_from_start: false,
            destination: destination.into(),
        }
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    pub fn with_selection(mut self, selection: RangeSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_live_from_start(mut self, live_from_start: bool) -> Self {
        self.live_from_start = live_from_start;
        self
    }
}

/// Check that the destination is usable and create its parent directories.
pub fn validate_output_path(path: &Path) -> Result<()> {
    if path.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(Error::InvalidOutputPath(
            "output path cannot be empty".to_string(),
        ));
    }

    if path.is_dir() {
        return Err(Error::InvalidOutputPath(format!(
            "'{}' is a directory",
            path.display()
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| {
            Error::InvalidOutputPath(format!(
                "could not create directory '{}': {err}",
                parent.display()
            ))
        })?;
    }

    Ok(())
}

/// Whether the URL points to a video site the extraction setup is tuned for.
pub fn is_supported_url(url: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();

    RE.get_or_init(|| {
        Regex::new(r"^https?://(?:(?:www|m|music)\.)?(?:youtube\.com|youtu\.be)(?:[/?#:]|$)")
            .expect("static regex")
    })
    .is_match(url.trim())
}

/// Final result of an acquisition or local trim.
///
/// `success` is only ever true once the destination file passed verification.
#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionOutcome {
    pub success: bool,
    pub file_path: Option<PathBuf>,
    pub file_size: Option<u64>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub video_info: Option<VideoMetadata>,
    /// Full asset kept in the cache, useful to reuse or debug
    pub cached_asset: Option<PathBuf>,
}

impl AcquisitionOutcome {
    pub fn succeeded(
        file_path: PathBuf,
        file_size: u64,
        video_info: Option<VideoMetadata>,
        cached_asset: Option<PathBuf>,
    ) -> Self {
        Self {
            success: true,
            file_path: Some(file_path),
            file_size: Some(file_size),
            error_kind: None,
            error_message: None,
            video_info,
            cached_asset,
        }
    }

    pub fn failed(
        error: &Error,
        video_info: Option<VideoMetadata>,
        cached_asset: Option<PathBuf>,
    ) -> Self {
        Self {
            success: false,
            file_path: None,
            file_size: None,
            error_kind: Some(error.kind()),
            error_message: Some(error.to_string()),
            video_info,
            cached_asset,
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn empty_output_path_is_rejected() {
        for p in ["", "   "] {
            let err = validate_output_path(Path::new(p)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidOutputPath);
        }
    }

    #[test]
    fn output_parents_are_created() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested").join("deep").join("output.mp4");

        validate_output_path(&out).unwrap();
        assert!(out.parent().unwrap().is_dir());
        assert!(!out.exists());
    }

    #[test]
    fn directory_output_is_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(validate_output_path(dir.path()).is_err());
    }

    #[test]
    fn youtube_urls() {
        for ok in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?v=dQw4w9WgXcQ&t=42s",
            "http://youtu.be/dQw4w9WgXcQ",
            "https://m.youtube.com/shorts/abc",
            "https://music.youtube.com/watch?v=x",
        ] {
            assert!(is_supported_url(ok), "{ok}");
        }

        for bad in [
            "",
            "youtube.com/watch?v=x",
            "ftp://youtube.com/x",
            "https://vimeo.com/123",
            "https://notyoutube.com/watch?v=x",
            "https://youtube.com.evil.org/watch",
            "not a url",
        ] {
            assert!(!is_supported_url(bad), "{bad}");
        }
    }

    #[test]
    fn outcome_carries_the_kind() {
        let out = AcquisitionOutcome::failed(
            &Error::IncompleteDownload("abc.mp4.part".into()),
            None,
            None,
        );
        assert!(!out.success);
        assert_eq!(out.error_kind, Some(ErrorKind::IncompleteDownload));

        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["error_kind"], "incomplete_download");
        assert_eq!(json["file_path"], serde_json::Value::Null);
    }
}
