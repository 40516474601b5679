use std::{io, path::Path, time::Duration};

use serde::Deserialize;
use tracing::{debug, trace};

use crate::backoff::Backoff;

/// File name suffixes of downloads still in progress.
pub const PARTIAL_MARKERS: [&str; 2] = [".part", ".ytdl"];

/// File name fragment of intermediate trim outputs.
pub const CUT_MARKER: &str = "_cut_";

/// Whether the file name marks an in-progress download.
pub fn is_partial_name(name: &str) -> bool {
    PARTIAL_MARKERS.iter().any(|marker| name.ends_with(marker))
}

/// Whether the file name marks an intermediate trim output.
pub fn is_cut_name(name: &str) -> bool {
    name.contains(CUT_MARKER)
}

/// A file is valid if it is a non-empty regular file whose name
/// is neither a partial download nor a cut file.
pub fn is_valid(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };

    if is_partial_name(name) || is_cut_name(name) {
        return false;
    }

    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

/// How many size samples to take, and how far apart.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct StabilityPolicy {
    pub samples: u32,
    pub interval_ms: u64,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            samples: 3,
            interval_ms: 100,
        }
    }
}

impl StabilityPolicy {
    fn schedule(&self) -> Backoff {
        Backoff::fixed(Duration::from_millis(self.interval_ms), self.samples.max(2))
    }

    /// Sample the file size repeatedly; the file is stable only if every
    /// sample is identical and non-zero.
    ///
    /// This cannot see a writer that pauses longer than the sampling window.
    pub fn is_stable(&self, path: &Path) -> bool {
        self.is_stable_with(path, |p| std::fs::metadata(p).map(|m| m.len()), std::thread::sleep)
    }

    pub(crate) fn is_stable_with<F, S>(&self, path: &Path, mut size_of: F, mut sleep: S) -> bool
    where
        F: FnMut(&Path) -> io::Result<u64>,
        S: FnMut(Duration),
    {
        let schedule = self.schedule();
        let mut delays = schedule.delays();
        let mut first = None;

        for sample in 0..schedule.max_attempts {
            let size = match size_of(path) {
                Ok(size) => size,
                Err(err) => {
                    debug!("Could not read size of '{}': {err}", path.display());
                    return false;
                }
            };
            trace!("'{}' size sample {sample}: {size}", path.display());

            if size == 0 {
                return false;
            }
            match first {
                None => first = Some(size),
                Some(expected) if expected != size => {
                    debug!(
                        "'{}' is still being written ({expected} -> {size} bytes)",
                        path.display()
                    );
                    return false;
                }
                Some(_) => {}
            }

            if let Some(delay) = delays.next() {
                sleep(delay);
            }
        }

        true
    }
}
