use std::path::Path;

/// Video containers the extraction service is known to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    Mp4,
    Webm,
    Mkv,
    M4a,
    Flv,
    Avi,
    Mov,
}

impl Extension {
    /// Lookup order used when searching the cache for `<id>.<ext>`.
    pub const ALL: [Extension; 7] = [
        Extension::Mp4,
        Extension::Webm,
        Extension::Mkv,
        Extension::M4a,
        Extension::Flv,
        Extension::Avi,
        Extension::Mov,
    ];

    /// Return the extension without the leading dot.
    /// e.g. "ext"
    pub fn with_no_dot(self) -> &'static str {
        match self {
            Extension::Mp4 => "mp4",
            Extension::Webm => "webm",
            Extension::Mkv => "mkv",
            Extension::M4a => "m4a",
            Extension::Flv => "flv",
            Extension::Avi => "avi",
            Extension::Mov => "mov",
        }
    }

    /// Return the extension with the leading dot.
    /// e.g. ".ext"
    pub fn with_dot(self) -> &'static str {
        match self {
            Extension::Mp4 => ".mp4",
            Extension::Webm => ".webm",
            Extension::Mkv => ".mkv",
            Extension::M4a => ".m4a",
            Extension::Flv => ".flv",
            Extension::Avi => ".avi",
            Extension::Mov => ".mov",
        }
    }

    /// Parse the path file extension.
    /// Return None in case of no or unknown extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| {
                Self::ALL
                    .into_iter()
                    .find(|known| known.with_no_dot().eq_ignore_ascii_case(ext))
            })
    }
}
