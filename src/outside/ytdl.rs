use std::{
    collections::BTreeMap,
    ffi::OsString,
    fmt::Display,
    path::{Path, PathBuf},
    sync::OnceLock,
    time::Duration,
};

use regex::Regex;
use tracing::{debug, trace};

use super::command::{last_lines, run_command, run_command_with_lines, Capture};
use crate::{
    pipeline::{ProgressEvent, ProgressSink},
    result::{Error, Result},
    types::{RawVideoInfo, VideoMetadata},
};

/// Prefix of the progress lines printed through `--progress-template`.
const PROGRESS_TAG: &str = "[vidstash:progress]";
/// Prefix of the line printed once the final file is in place.
const DONE_TAG: &str = "[vidstash:done]";

/// Interface for the video extraction service.
pub trait Extractor: Sync {
    /// Fetch the video metadata, without downloading anything.
    fn probe(&self, url: &str) -> Result<VideoMetadata>;

    /// Download the video with one format selector.
    ///
    /// Progress reports are forwarded to the sink as they come.
    fn download(
        &self,
        job: &DownloadJob<'_>,
        progress: &ProgressSink,
    ) -> std::result::Result<DownloadReport, DownloadFailure>;
}

/// One download attempt.
#[derive(Debug, Clone)]
pub struct DownloadJob<'a> {
    pub url: &'a str,
    pub format: &'a str,
    /// Output template, in the extraction service syntax
    pub output_template: &'a Path,
    pub live: LiveOptions,
}

/// How a live stream should be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LiveOptions {
    /// Replay the stream from its beginning instead of its live edge
    pub from_start: bool,
    /// Stop recording after this long
    pub recording_limit: Option<Duration>,
}

impl LiveOptions {
    /// A live stream joined at its edge is bounded; anything else is
    /// replayed from the start when asked to.
    pub fn for_video(is_live: bool, from_start: bool, limit: Duration) -> Self {
        if is_live && !from_start {
            Self {
                from_start: false,
                recording_limit: Some(limit),
            }
        } else {
            Self {
                from_start,
                recording_limit: None,
            }
        }
    }
}

/// What a successful download told us.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadReport {
    /// Final file path, when the service reported it
    pub completed_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The format selector matched nothing
    FormatUnavailable,
    /// The server refused the request (HTTP 403)
    Forbidden,
    Other,
}

impl FailureKind {
    /// Whether another format selector may succeed where this one failed.
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::FormatUnavailable | FailureKind::Forbidden)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl DownloadFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify the failure from the service error output.
    pub fn from_stderr(stderr: &str) -> Self {
        let errors: Vec<&str> = stderr
            .lines()
            .filter(|line| line.starts_with("ERROR:"))
            .collect();

        let message = if errors.is_empty() {
            last_lines(stderr, 3)
        } else {
            errors.join(" | ")
        };

        Self::new(classify_failure(&message), message)
    }
}

impl Display for DownloadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Sort an error message into the failure kinds the format ladder cares about.
pub fn classify_failure(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    if lower.contains("format is not available") {
        FailureKind::FormatUnavailable
    } else if message.contains("403") || lower.contains("forbidden") {
        FailureKind::Forbidden
    } else {
        FailureKind::Other
    }
}

/// Options forwarded to the extraction service on every download.
#[derive(Debug, Clone, PartialEq)]
pub struct YtdlOptions {
    pub skip_cert_check: bool,
    pub retries: u32,
    pub fragment_retries: u32,
    pub file_access_retries: u32,
    pub sleep_interval: u32,
    pub max_sleep_interval: u32,
    pub sleep_requests: u32,
    pub player_clients: Vec<String>,
    pub headers: BTreeMap<String, String>,
    pub probe_timeout: Duration,
}

/// Interface for the [yt-dlp](https://github.com/yt-dlp/yt-dlp) program
#[derive(Debug)]
pub struct Ytdl {
    program: PathBuf,
    options: YtdlOptions,
    /// Outcome of the `--version` check, made on first use
    availability: OnceLock<std::result::Result<(), String>>,
}

impl Ytdl {
    pub fn new(program: impl Into<PathBuf>, options: YtdlOptions) -> Self {
        Self {
            program: program.into(),
            options,
            availability: OnceLock::new(),
        }
    }

    /// Verify once that the binary is reachable.
    fn ensure_available(&self) -> Result<()> {
        self.availability
            .get_or_init(|| {
                run_command(
                    &self.program,
                    |cmd| cmd.arg("--version"),
                    Capture::STDOUT | Capture::STDERR,
                    Some(self.options.probe_timeout),
                )
                .and_then(|out| out.check_success(&self.program))
                .map(|out| debug!("{} version {}", self.program.display(), out.stdout.trim()))
                .map_err(|err| err.detail().to_owned())
            })
            .clone()
            .map_err(Error::ToolInvocationFailed)
    }

    fn common_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--no-warnings".into(), "--no-playlist".into()];
        if self.options.skip_cert_check {
            args.push("--no-check-certificates".into());
        }
        args
    }

    pub fn probe_args(&self, url: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-q".into(), "--skip-download".into(), "-J".into()];
        args.extend(self.common_args());
        args.push("--".into());
        args.push(url.into());
        args
    }

    pub fn download_args(&self, job: &DownloadJob<'_>) -> Vec<OsString> {
        let opts = &self.options;
        let mut args: Vec<OsString> = vec![
            "--newline".into(),
            "--no-colors".into(),
            "--progress".into(),
            "--progress-template".into(),
            format!(
                "download:{PROGRESS_TAG} %(progress.status)s|%(progress._percent_str)s|\
                %(progress.downloaded_bytes)s|%(progress.total_bytes)s|\
                %(progress._speed_str)s|%(progress._eta_str)s"
            )
            .into(),
            "--print".into(),
            format!("after_move:{DONE_TAG} %(filepath)s").into(),
            "--no-simulate".into(),
        ];
        args.extend(self.common_args());

        args.push("-o".into());
        args.push(job.output_template.as_os_str().to_owned());
        args.push("-f".into());
        args.push(job.format.into());

        for (flag, value) in [
            ("--retries", opts.retries),
            ("--fragment-retries", opts.fragment_retries),
            ("--file-access-retries", opts.file_access_retries),
            ("--sleep-interval", opts.sleep_interval),
            ("--max-sleep-interval", opts.max_sleep_interval),
            ("--sleep-requests", opts.sleep_requests),
        ] {
            args.push(flag.into());
            args.push(value.to_string().into());
        }

        if !opts.player_clients.is_empty() {
            args.push("--extractor-args".into());
            args.push(format!("youtube:player_client={}", opts.player_clients.join(",")).into());
        }
        for (name, value) in &opts.headers {
            args.push("--add-header".into());
            args.push(format!("{name}:{value}").into());
        }

        if job.live.from_start {
            args.push("--live-from-start".into());
        } else {
            args.push("--no-live-from-start".into());
        }
        if let Some(limit) = job.live.recording_limit {
            // The native downloader has no duration bound, ffmpeg does
            args.push("--downloader".into());
            args.push("ffmpeg".into());
            args.push("--downloader-args".into());
            args.push(format!("ffmpeg:-t {}", limit.as_secs()).into());
        }

        args.push("--".into());
        args.push(job.url.into());
        args
    }
}

impl Extractor for Ytdl {
    fn probe(&self, url: &str) -> Result<VideoMetadata> {
        let unavailable = |err: Error| Error::MetadataUnavailable(err.detail().to_owned());

        self.ensure_available().map_err(unavailable)?;
        let out = run_command(
            &self.program,
            |cmd| cmd.args(self.probe_args(url)),
            Capture::STDOUT | Capture::STDERR,
            Some(self.options.probe_timeout),
        )
        .and_then(|out| out.check_success(&self.program))
        .map_err(unavailable)?;

        let raw: RawVideoInfo = serde_json::from_str(&out.stdout)
            .map_err(|err| Error::MetadataUnavailable(format!("could not parse JSON: {err}")))?;
        if raw.id.is_none() {
            return Err(Error::MetadataUnavailable("no video ID in the metadata".to_string()));
        }

        Ok(raw.into())
    }

    fn download(
        &self,
        job: &DownloadJob<'_>,
        progress: &ProgressSink,
    ) -> std::result::Result<DownloadReport, DownloadFailure> {
        let other = |err: Error| DownloadFailure::new(FailureKind::Other, err.detail());
        self.ensure_available().map_err(other)?;

        let mut report = DownloadReport::default();
        let out = run_command_with_lines(
            &self.program,
            |cmd| cmd.args(self.download_args(job)),
            Capture::STDOUT | Capture::STDERR,
            None,
            |line| match parse_output_line(line) {
                Some(OutputLine::Downloading(event)) => progress.send(event),
                Some(OutputLine::Finished) => trace!("Download stream finished"),
                Some(OutputLine::Done(path)) => report.completed_path = Some(path),
                None => {}
            },
        )
        .map_err(other)?;

        if out.status.success() {
            Ok(report)
        } else {
            Err(DownloadFailure::from_stderr(&out.stderr))
        }
    }
}

/// The lines of the download output we understand.
#[derive(Debug, PartialEq)]
enum OutputLine {
    Downloading(ProgressEvent),
    Finished,
    Done(PathBuf),
}

/// `NA` is what the output template prints for a missing field.
fn na(s: &str) -> Option<&str> {
    Some(s.trim()).filter(|s| !s.is_empty() && *s != "NA")
}

fn bytes(s: &str) -> Option<u64> {
    // Some extractors report fractional byte counts
    na(s).and_then(|s| s.parse::<f64>().ok()).map(|b| b as u64)
}

fn parse_output_line(line: &str) -> Option<OutputLine> {
    static ANSI: OnceLock<Regex> = OnceLock::new();

    let line = ANSI
        .get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").expect("static regex"))
        .replace_all(line, "");

    if let Some(path) = line.strip_prefix(DONE_TAG) {
        let path = path.trim();
        return (!path.is_empty() && path != "NA").then(|| OutputLine::Done(PathBuf::from(path)));
    }

    let fields: Vec<&str> = line.strip_prefix(PROGRESS_TAG)?.trim().split('|').collect();
    let [status, percent, downloaded, total, speed, eta] = fields[..] else {
        return None;
    };

    match status.trim() {
        "downloading" => Some(OutputLine::Downloading(ProgressEvent::new(
            na(percent),
            bytes(downloaded),
            bytes(total),
            na(speed),
            na(eta),
        ))),
        "finished" => Some(OutputLine::Finished),
        _ => None,
    }
}
