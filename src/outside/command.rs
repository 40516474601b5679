use std::{
    ffi::OsStr,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use bitflags::bitflags;
use crossbeam_channel::RecvTimeoutError;
use tracing::{debug, trace, warn, Level};

use crate::result::{Error, Result};

pub const FFXXX_DEFAULT_ARGS: [&str; 3] = ["-hide_banner", "-loglevel", "error"];

/// Characters that have a meaning for a shell and never appear in a sane tool path.
const SHELL_METACHARACTERS: [char; 9] = [';', '&', '|', '$', '`', '<', '>', '\n', '\r'];

/// How often a running command is checked for completion or timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capture: u8 {
        const STDOUT = 0b0000010;
        const STDERR = 0b0000100;
    }
}

/// What a finished command left behind.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Turn a non-zero exit into [`Error::ToolInvocationFailed`].
    pub fn check_success(self, program: &Path) -> Result<Self> {
        if self.status.success() {
            Ok(self)
        } else {
            Err(Error::ToolInvocationFailed(format!(
                "{} did run but was not successful ({}): {}",
                program.display(),
                self.status,
                last_lines(&self.stderr, 5)
            )))
        }
    }
}

/// Run a command until it exits or the timeout elapses.
///
/// IO handles will be captured only if the caller required it or if the log level is Debug.
/// In that last case, `stdout` and `stderr` will be logged.
///
/// The function returns an error if the command failed to start or timed out.
/// If the program runs but returns a non-0 status code, it will not trigger an error.
pub fn run_command<F>(
    program: &Path,
    f: F,
    capture: Capture,
    timeout: Option<Duration>,
) -> Result<CommandOutput>
where
    F: FnOnce(&mut Command) -> &mut Command,
{
    run_command_with_lines(program, f, capture, timeout, |_| {})
}

/// Same as [`run_command`], also handing every `stdout` line to `on_line`
/// while the command is running.
pub fn run_command_with_lines<F, L>(
    program: &Path,
    f: F,
    capture: Capture,
    timeout: Option<Duration>,
    mut on_line: L,
) -> Result<CommandOutput>
where
    F: FnOnce(&mut Command) -> &mut Command,
    L: FnMut(&str),
{
    let is_debug = tracing::enabled!(Level::DEBUG);
    let get_io = |capture| {
        if capture {
            Stdio::piped()
        } else {
            Stdio::null()
        }
    };

    let mut cmd = Command::new(program);
    let cmd = f(&mut cmd)
        .stdin(Stdio::null())
        .stdout(get_io(is_debug || capture.contains(Capture::STDOUT)))
        .stderr(get_io(is_debug || capture.contains(Capture::STDERR)));

    debug!("Executing command: {cmd:?}");
    let mut child = cmd.spawn().map_err(|err| {
        Error::ToolInvocationFailed(format!("could not run {}: {err}", program.display()))
    })?;

    // Pipes are drained on their own threads so that a chatty child never blocks on a full pipe
    let (line_send, line_recv) = crossbeam_channel::unbounded::<String>();
    if let Some(out) = child.stdout.take() {
        thread::spawn(move || {
            for line in BufReader::new(out).lines().map_while(std::io::Result::ok) {
                if line_send.send(line).is_err() {
                    break;
                }
            }
        });
    } else {
        drop(line_send);
    }
    let stderr_reader = child.stderr.take().map(|mut err| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = err.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    });

    let mut stdout = String::new();
    let mut handle_line = |line: String| {
        on_line(&line);
        stdout.push_str(&line);
        stdout.push('\n');
    };

    let deadline = timeout.map(|t| Instant::now() + t);
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(err) => {
                return Err(Error::ToolInvocationFailed(format!(
                    "could not wait for {}: {err}",
                    program.display()
                )))
            }
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            if let Err(err) = child.kill() {
                warn!("Could not kill {}: {err}", program.display());
            }
            let _ = child.wait();
            return Err(Error::ToolInvocationFailed(format!(
                "{} timed out after {}s",
                program.display(),
                timeout.unwrap_or_default().as_secs_f64()
            )));
        }

        match line_recv.recv_timeout(POLL_INTERVAL) {
            Ok(line) => handle_line(line),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => thread::sleep(POLL_INTERVAL),
        }
    };

    // Lines still in flight when the process exited
    for line in line_recv.iter() {
        handle_line(line);
    }
    let stderr = stderr_reader
        .and_then(|reader| reader.join().ok())
        .unwrap_or_default();

    if is_debug {
        debug!("status: {status}");
        debug!("stdout: {} bytes long", stdout.len());
        trace!("stdout: {stdout:?}");
        debug!("stderr: {} bytes long", stderr.len());
        trace!("stderr: {stderr:?}");
    }

    Ok(CommandOutput {
        status,
        stdout,
        stderr,
    })
}

/// Run the command and verify that it has returned a success status code.
pub fn assert_success_command<F>(program: &Path, f: F, timeout: Option<Duration>) -> Result<()>
where
    F: FnOnce(&mut Command) -> &mut Command,
{
    run_command(program, f, Capture::STDERR, timeout)?.check_success(program)?;
    Ok(())
}

/// Check an external tool path before ever executing it.
///
/// Shell metacharacters are rejected outright. A bare program name is
/// resolved through `PATH`, anything else must exist as given.
pub fn validate_tool_path(raw: &str) -> Result<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::ToolValidationFailed(
            "tool path cannot be empty".to_string(),
        ));
    }

    if raw.contains(SHELL_METACHARACTERS) {
        return Err(Error::ToolValidationFailed(format!(
            "Invalid characters in tool path '{}'",
            raw.escape_debug()
        )));
    }

    let path = Path::new(raw);
    if path.components().count() > 1 || path.is_absolute() {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(Error::ToolValidationFailed(format!(
                "'{}' does not exist",
                path.display()
            )))
        };
    }

    find_in_path(path.as_os_str(), std::env::var_os("PATH").as_deref()).ok_or_else(|| {
        Error::ToolValidationFailed(format!("'{raw}' not found in PATH"))
    })
}

/// Look for an executable in the directories of a `PATH`-like variable.
fn find_in_path(program: &OsStr, path_var: Option<&OsStr>) -> Option<PathBuf> {
    let dirs = std::env::split_paths(path_var?).collect::<Vec<_>>();

    let mut names = vec![PathBuf::from(program)];
    if cfg!(windows) && Path::new(program).extension().is_none() {
        names.push(Path::new(program).with_extension("exe"));
    }

    dirs.iter()
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

/// The last non-empty lines of some tool output, the part worth reporting.
pub fn last_lines(output: &str, n: usize) -> String {
    let lines: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].join(" | ")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::result::ErrorKind;

    #[test]
    fn rejects_shell_metacharacters() {
        let tainted = [
            "ffmpeg; rm -rf /",
            "ffmpeg & rm -rf /",
            "ffmpeg | cat",
            "$(ffmpeg)",
            "`ffmpeg`",
        ];
        for raw in tainted {
            let err = validate_tool_path(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ToolValidationFailed, "{raw}");
            assert!(err.to_string().contains("Invalid characters"), "{raw}");
        }
    }

    #[test]
    fn rejects_empty_path() {
        let err = validate_tool_path("  ").unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn absolute_path_must_exist() {
        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("ffmpeg");
        fs::write(&tool, b"").unwrap();

        assert_eq!(validate_tool_path(tool.to_str().unwrap()).unwrap(), tool);

        let err = validate_tool_path("/nonexistent/ffmpeg").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolValidationFailed);
    }

    #[test]
    fn bare_name_is_searched_in_path() {
        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("ffmpeg");
        fs::write(&tool, b"").unwrap();

        let path_var = std::env::join_paths(["/nonexistent/bin".into(), dir.path().to_path_buf()])
            .unwrap();
        assert_eq!(
            find_in_path(OsStr::new("ffmpeg"), Some(&path_var)),
            Some(tool)
        );
        assert_eq!(find_in_path(OsStr::new("nonexistent"), Some(&path_var)), None);
        assert_eq!(find_in_path(OsStr::new("ffmpeg"), None), None);
    }

    #[test]
    fn last_lines_skips_blanks() {
        let out = "a\n\nb\nc\n  \nd\n";
        assert_eq!(last_lines(out, 2), "c | d");
        assert_eq!(last_lines(out, 10), "a | b | c | d");
        assert_eq!(last_lines("", 3), "");
    }

    #[test]
    fn missing_binary_is_an_invocation_failure() {
        let err = run_command(
            Path::new("/nonexistent/tool"),
            |cmd| cmd.arg("--version"),
            Capture::empty(),
            None,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolInvocationFailed);
    }

    #[cfg(unix)]
    #[test]
    fn streams_stdout_lines() {
        let mut seen = vec![];
        let out = run_command_with_lines(
            Path::new("sh"),
            |cmd| cmd.args(["-c", "echo first; echo second"]),
            Capture::STDOUT,
            Some(Duration::from_secs(30)),
            |line| seen.push(line.to_owned()),
        )
        .unwrap();

        assert!(out.status.success());
        assert_eq!(seen, vec!["first", "second"]);
        assert_eq!(out.stdout, "first\nsecond\n");
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_reported_with_stderr() {
        let program = Path::new("sh");
        let err = run_command(
            program,
            |cmd| cmd.args(["-c", "echo broken >&2; exit 3"]),
            Capture::STDERR,
            None,
        )
        .unwrap()
        .check_success(program)
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ToolInvocationFailed);
        assert!(err.to_string().contains("broken"));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_the_command() {
        let start = Instant::now();
        let err = run_command(
            Path::new("sleep"),
            |cmd| cmd.arg("30"),
            Capture::empty(),
            Some(Duration::from_millis(200)),
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ToolInvocationFailed);
        assert!(err.to_string().contains("timed out"));
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
