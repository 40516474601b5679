use std::{fmt::Display, str::FromStr};

use serde::Deserialize;

use crate::result::{Error, Result};

/// A time range to keep out of a video, in seconds.
///
/// A missing start means "from the beginning", a missing end means
/// "until the end of the stream".
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct TrimSpec {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl TrimSpec {
    pub fn new(start: Option<f64>, end: Option<f64>) -> Self {
        Self { start, end }
    }

    /// True when the range keeps the whole stream.
    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Validate the bounds and return the `(seek, duration)` pair
    /// to give to the media tool.
    ///
    /// The duration is `end - start`, or `end` alone without a start,
    /// and must be strictly positive.
    pub fn seek_and_duration(&self) -> Result<(Option<f64>, Option<f64>)> {
        if let Some(start) = self.start {
            if !start.is_finite() || start < 0.0 {
                return Err(Error::TrimFailed(format!(
                    "start time must be a non-negative number of seconds, got {start}"
                )));
            }
        }

        let duration = match self.end {
            Some(end) => {
                let duration = end - self.start.unwrap_or(0.0);
                if !duration.is_finite() || duration <= 0.0 {
                    return Err(Error::TrimFailed(format!(
                        "invalid duration {duration}s for range {self}"
                    )));
                }
                Some(duration)
            }
            None => None,
        };

        Ok((self.start, duration))
    }
}

impl Display for TrimSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.start {
            Some(start) => write!(f, "{}", fmt_secs(start))?,
            None => write!(f, "START")?,
        }
        write!(f, " - ")?;
        match self.end {
            Some(end) => write!(f, "{}", fmt_secs(end)),
            None => write!(f, "END"),
        }
    }
}

/// The clipping requested for an acquisition.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RangeSelection {
    #[default]
    Full,
    Single(TrimSpec),
    Multi(Vec<TrimSpec>),
}

impl RangeSelection {
    /// Build the selection out of the optional single range and the optional
    /// section list. Sections take precedence over the single range.
    pub fn resolve(single: Option<TrimSpec>, sections: Option<Vec<TrimSpec>>) -> Self {
        match (sections, single) {
            (Some(sections), _) => RangeSelection::Multi(sections),
            (None, Some(spec)) if !spec.is_full() => RangeSelection::Single(spec),
            _ => RangeSelection::Full,
        }
    }
}

/// Format seconds for a command line: integral values lose the fraction.
pub fn fmt_secs(secs: f64) -> String {
    format!("{secs}")
}

/// A time given on the command line, either plain seconds (`90`, `12.5`)
/// or colon separated (`1:30`, `01:02:03`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seconds(pub f64);

impl FromStr for Seconds {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty time".to_string());
        }

        let mut secs = 0.0;
        for part in s.split(':') {
            let n: f64 = part
                .parse()
                .map_err(|_| format!("'{s}' is not a time in seconds or [HH:]MM:SS"))?;
            secs = 60.0 * secs + n;
        }
        Ok(Seconds(secs))
    }
}

/// Parse the JSON section list format: `[{"start": 10, "end": 30}, ...]`.
pub fn parse_sections(json: &str) -> std::result::Result<Vec<TrimSpec>, serde_json::Error> {
    serde_json::from_str(json)
}
