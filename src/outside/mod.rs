mod command;
mod ffmpeg;
mod ytdl;

pub use command::{validate_tool_path, Capture, CommandOutput};
pub use ffmpeg::{Ffmpeg, MediaTool};
pub use ytdl::{
    classify_failure, DownloadFailure, DownloadJob, DownloadReport, Extractor, FailureKind,
    LiveOptions, Ytdl, YtdlOptions,
};
