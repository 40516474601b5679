use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

/// Terminal failure of a pipeline step.
///
/// Format fallback and file discovery retries are handled where they happen;
/// anything that reaches this type ends the acquisition.
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Invalid video ID: {0}")]
    #[diagnostic(code(vidstash::invalid_identifier))]
    InvalidIdentifier(String),

    #[error("Invalid output path: {0}")]
    #[diagnostic(code(vidstash::invalid_output_path))]
    InvalidOutputPath(String),

    #[error("Failed to extract video information: {0}")]
    #[diagnostic(code(vidstash::metadata_unavailable))]
    MetadataUnavailable(String),

    #[error("Cached video file not usable: {0}")]
    #[diagnostic(code(vidstash::cache_asset_invalid))]
    CacheAssetInvalid(String),

    #[error("All format selectors failed. Last error: {0}")]
    #[diagnostic(
        code(vidstash::acquisition_exhausted),
        help("the requested quality may not exist for this video, try `best`")
    )]
    AcquisitionExhausted(String),

    #[error("Download failed: {0}")]
    #[diagnostic(code(vidstash::download_failed))]
    DownloadFailed(String),

    #[error("Download completed but file not found after waiting: {0}")]
    #[diagnostic(code(vidstash::file_not_found_after_acquisition))]
    FileNotFoundAfterAcquisition(String),

    #[error("Download incomplete, only a partial file was found: {0}")]
    #[diagnostic(
        code(vidstash::incomplete_download),
        help("the download may have been interrupted, run the same request again")
    )]
    IncompleteDownload(String),

    #[error("Unusable external tool: {0}")]
    #[diagnostic(code(vidstash::tool_validation_failed))]
    ToolValidationFailed(String),

    #[error("External tool failed: {0}")]
    #[diagnostic(code(vidstash::tool_invocation_failed))]
    ToolInvocationFailed(String),

    #[error("Failed to cut video: {0}")]
    #[diagnostic(code(vidstash::trim_failed))]
    TrimFailed(String),

    #[error("Failed to cut and join sections: {0}")]
    #[diagnostic(code(vidstash::stitch_failed))]
    StitchFailed(String),

    #[error("Output verification failed: {0}")]
    #[diagnostic(code(vidstash::verification_failed))]
    VerificationFailed(String),
}

/// Data-only view of an [`Error`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidIdentifier,
    InvalidOutputPath,
    MetadataUnavailable,
    CacheAssetInvalid,
    AcquisitionExhausted,
    DownloadFailed,
    FileNotFoundAfterAcquisition,
    IncompleteDownload,
    ToolValidationFailed,
    ToolInvocationFailed,
    TrimFailed,
    StitchFailed,
    VerificationFailed,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            Error::InvalidOutputPath(_) => ErrorKind::InvalidOutputPath,
            Error::MetadataUnavailable(_) => ErrorKind::MetadataUnavailable,
            Error::CacheAssetInvalid(_) => ErrorKind::CacheAssetInvalid,
            Error::AcquisitionExhausted(_) => ErrorKind::AcquisitionExhausted,
            Error::DownloadFailed(_) => ErrorKind::DownloadFailed,
            Error::FileNotFoundAfterAcquisition(_) => ErrorKind::FileNotFoundAfterAcquisition,
            Error::IncompleteDownload(_) => ErrorKind::IncompleteDownload,
            Error::ToolValidationFailed(_) => ErrorKind::ToolValidationFailed,
            Error::ToolInvocationFailed(_) => ErrorKind::ToolInvocationFailed,
            Error::TrimFailed(_) => ErrorKind::TrimFailed,
            Error::StitchFailed(_) => ErrorKind::StitchFailed,
            Error::VerificationFailed(_) => ErrorKind::VerificationFailed,
        }
    }

    /// The human-readable detail, without the variant description.
    pub fn detail(&self) -> &str {
        match self {
            Error::InvalidIdentifier(d)
            | Error::InvalidOutputPath(d)
            | Error::MetadataUnavailable(d)
            | Error::CacheAssetInvalid(d)
            | Error::AcquisitionExhausted(d)
            | Error::DownloadFailed(d)
            | Error::FileNotFoundAfterAcquisition(d)
            | Error::IncompleteDownload(d)
            | Error::ToolValidationFailed(d)
            | Error::ToolInvocationFailed(d)
            | Error::TrimFailed(d)
            | Error::StitchFailed(d)
            | Error::VerificationFailed(d) => d,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_has_no_variant_prefix() {
        let err = Error::TrimFailed("ffmpeg exited with 1".into());

        assert_eq!(err.kind(), ErrorKind::TrimFailed);
        assert_eq!(err.detail(), "ffmpeg exited with 1");
        assert_eq!(err.to_string(), "Failed to cut video: ffmpeg exited with 1");
    }

    #[test]
    fn kind_serializes_in_snake_case() {
        let json = serde_json::to_string(&ErrorKind::IncompleteDownload).unwrap();
        assert_eq!(json, "\"incomplete_download\"");
    }
}
