use std::fmt::Display;

use crate::result::{Error, Result};

/// Characters that are never kept in a cache file name.
const FORBIDDEN: [char; 9] = ['/', '\\', '<', '>', ':', '"', '|', '?', '*'];

/// A video ID as returned by the extraction service, along with
/// the form of it that is safe to use as a file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoIdentity {
    raw: String,
    sanitized: String,
}

impl VideoIdentity {
    /// Build the identity, failing if nothing usable remains after sanitization.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let sanitized = sanitize(&raw)?;
        Ok(Self { raw, sanitized })
    }

    pub fn sanitized(&self) -> &str {
        &self.sanitized
    }

    /// The forms to look for on disk, raw first.
    ///
    /// Assets downloaded before sanitization existed are named after the raw ID.
    pub fn lookup_keys(&self) -> Vec<&str> {
        if self.raw == self.sanitized {
            vec![&self.raw]
        } else {
            vec![&self.raw, &self.sanitized]
        }
    }
}

impl Display for VideoIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Normalize a raw video ID into a file-name-safe form.
///
/// Path separators, reserved characters and control characters are removed,
/// then leading and trailing dots and whitespace are stripped.
pub fn sanitize(raw: &str) -> Result<String> {
    let kept: String = raw
        .chars()
        .filter(|c| !FORBIDDEN.contains(c) && !c.is_control())
        .collect();

    let trimmed = kept.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        return Err(Error::InvalidIdentifier(format!(
            "'{}' is empty after sanitization",
            raw.escape_debug()
        )));
    }

    Ok(trimmed.to_owned())
}
