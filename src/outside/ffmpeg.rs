use std::{
    ffi::OsString,
    fmt::Debug,
    path::{Path, PathBuf},
    time::Duration,
};

use super::command::{assert_success_command, validate_tool_path, FFXXX_DEFAULT_ARGS};
use crate::{result::Result, types::fmt_secs};

/// Interface for the media tool cutting and joining video files.
///
/// Both operations copy the streams as-is, so cuts land on keyframes.
pub trait MediaTool: Sync + Debug {
    /// Copy the part of `input` starting at `seek` and lasting `duration` into `output`.
    ///
    /// Without a seek the copy starts at the beginning, without a duration
    /// it continues until the end of the stream.
    fn trim(
        &self,
        input: &Path,
        output: &Path,
        seek: Option<f64>,
        duration: Option<f64>,
    ) -> Result<()>;

    /// Join the files listed in a concat manifest into `output`.
    ///
    /// Every listed file must share the same codec parameters.
    fn concat(&self, manifest: &Path, output: &Path) -> Result<()>;
}

/// Interface for the [ffmpeg](https://ffmpeg.org) program
#[derive(Debug)]
pub struct Ffmpeg {
    program: PathBuf,
    timeout: Duration,
}

impl Ffmpeg {
    /// Resolve and validate the `ffmpeg` binary path.
    pub fn new(raw_path: &str, timeout: Duration) -> Result<Self> {
        let program = validate_tool_path(raw_path)?;
        Ok(Self { program, timeout })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// Stream copy of a time range.
///
/// The seek goes before the input: with stream copy, seeking on the output
/// side would keep everything up to the next keyframe.
pub fn trim_args(
    input: &Path,
    output: &Path,
    seek: Option<f64>,
    duration: Option<f64>,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = FFXXX_DEFAULT_ARGS.iter().map(OsString::from).collect();

    if let Some(seek) = seek {
        args.push("-ss".into());
        args.push(fmt_secs(seek).into());
    }
    args.push("-i".into());
    args.push(input.as_os_str().to_owned());
    args.push("-c".into());
    args.push("copy".into());
    if let Some(duration) = duration {
        args.push("-t".into());
        args.push(fmt_secs(duration).into());
    }
    args.push("-avoid_negative_ts".into());
    args.push("make_zero".into());
    args.push("-y".into());
    args.push(output.as_os_str().to_owned());
    args
}

pub fn concat_args(manifest: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = FFXXX_DEFAULT_ARGS.iter().map(OsString::from).collect();
    // `-safe 0` allows the absolute paths of the manifest
    for arg in ["-f", "concat", "-safe", "0", "-i"] {
        args.push(arg.into());
    }
    args.push(manifest.as_os_str().to_owned());
    for arg in ["-c", "copy", "-y"] {
        args.push(arg.into());
    }
    args.push(output.as_os_str().to_owned());
    args
}

impl MediaTool for Ffmpeg {
    fn trim(
        &self,
        input: &Path,
        output: &Path,
        seek: Option<f64>,
        duration: Option<f64>,
    ) -> Result<()> {
        assert_success_command(
            &self.program,
            |cmd| cmd.args(trim_args(input, output, seek, duration)),
            Some(self.timeout),
        )
    }

    fn concat(&self, manifest: &Path, output: &Path) -> Result<()> {
        assert_success_command(
            &self.program,
            |cmd| cmd.args(concat_args(manifest, output)),
            Some(self.timeout),
        )
    }
}
