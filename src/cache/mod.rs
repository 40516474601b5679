mod discovery;
mod stability;

use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use tracing::{debug, trace};

use crate::{
    backoff::Backoff,
    result::Result,
    types::{Extension, VideoIdentity},
};

pub use stability::{is_cut_name, is_partial_name, is_valid, StabilityPolicy, CUT_MARKER};

/// A complete copy of a video kept in the shared cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAsset {
    pub path: PathBuf,
    pub id: String,
    pub extension: Option<Extension>,
    /// Outcome of the last stability check
    pub stable: bool,
}

/// Storage of full video assets, keyed by video identity.
///
/// The cache is shared between processes without any locking: two
/// acquisitions of the same video may race on the same files.
pub trait AssetCache: Sync {
    /// Directory where downloads land and where temporaries are created.
    fn root(&self) -> &Path;

    /// Look for a stable, complete asset of the video.
    fn get(&self, identity: &VideoIdentity) -> Option<CachedAsset>;

    /// Admit the asset a download just produced.
    ///
    /// `completed` is the path reported by the extraction service, if any.
    fn put(&self, identity: &VideoIdentity, completed: Option<&Path>) -> Result<CachedAsset>;

    /// Whether the file is still valid and stable.
    fn verify(&self, path: &Path) -> bool;

    /// Download output template for the video, in the extraction service syntax.
    fn download_template(&self, identity: &VideoIdentity) -> PathBuf {
        let id = identity.sanitized().replace('%', "%%");
        self.root().join(format!("{id}.%(ext)s"))
    }
}

/// [`AssetCache`] backed by a plain directory, usually the OS temp directory.
#[derive(Debug, Clone)]
pub struct DirCache {
    root: PathBuf,
    stability: StabilityPolicy,
    discovery: Backoff,
}

impl DirCache {
    pub fn new(root: impl Into<PathBuf>, stability: StabilityPolicy, discovery: Backoff) -> Self {
        Self {
            root: root.into(),
            stability,
            discovery,
        }
    }

    /// Make sure the directory exists.
    pub fn create(self) -> std::io::Result<Self> {
        std::fs::create_dir_all(&self.root)?;
        Ok(self)
    }

    /// Find a cached asset named after one of the lookup keys.
    ///
    /// For every key, files named exactly `<key>.<ext>` are tried first, largest
    /// first. Then any other `<key>.*` file, most recently modified first.
    pub fn locate(&self, identity: &VideoIdentity) -> Option<CachedAsset> {
        for key in identity.lookup_keys() {
            // Such a key cannot name a file of the cache directory
            if key.contains(['/', '\\']) {
                continue;
            }
            debug!("Looking for cached '{key}' in '{}'", self.root.display());

            let mut exact: Vec<Candidate> = Extension::ALL
                .into_iter()
                .map(|ext| self.root.join(format!("{key}{}", ext.with_dot())))
                .filter(|p| is_valid(p))
                .filter_map(Candidate::read)
                .collect();
            exact.sort_by(|a, b| b.size.cmp(&a.size));

            let mut prefixed: Vec<Candidate> = self
                .list_prefixed(&format!("{key}."))
                .into_iter()
                .filter(|c| !exact.iter().any(|e| e.path == c.path))
                .collect();
            prefixed.sort_by(|a, b| b.modified.cmp(&a.modified));

            for candidate in exact.into_iter().chain(prefixed) {
                if self.stability.is_stable(&candidate.path) {
                    debug!("Cache hit: '{}'", candidate.path.display());
                    return Some(candidate.into_asset(key));
                }
                trace!("Skipping unstable '{}'", candidate.path.display());
            }
        }

        None
    }

    /// Valid files of the root directory whose name starts with the prefix.
    fn list_prefixed(&self, prefix: &str) -> Vec<Candidate> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Could not read '{}': {err}", self.root.display());
                return vec![];
            }
        };

        entries
            .flatten()
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with(prefix))
            })
            .map(|entry| entry.path())
            .filter(|p| is_valid(p))
            .filter_map(Candidate::read)
            .collect()
    }

    /// Partial download files of the video, whatever key they were written under.
    fn list_partials(&self, identity: &VideoIdentity) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return vec![];
        };

        let keys = identity.lookup_keys();
        entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_owned();
                let matches = keys.iter().any(|k| name.starts_with(k)) && is_partial_name(&name);
                matches.then(|| entry.path())
            })
            .collect()
    }
}

impl AssetCache for DirCache {
    fn root(&self) -> &Path {
        &self.root
    }

    fn get(&self, identity: &VideoIdentity) -> Option<CachedAsset> {
        self.locate(identity)
    }

    fn put(&self, identity: &VideoIdentity, completed: Option<&Path>) -> Result<CachedAsset> {
        self.discover(identity, completed)
    }

    fn verify(&self, path: &Path) -> bool {
        is_valid(path) && self.stability.is_stable(path)
    }
}

#[derive(Debug)]
struct Candidate {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

impl Candidate {
    fn read(path: PathBuf) -> Option<Self> {
        let meta = std::fs::metadata(&path).ok()?;
        Some(Self {
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            path,
        })
    }

    fn into_asset(self, key: &str) -> CachedAsset {
        CachedAsset {
            extension: Extension::from_path(&self.path),
            path: self.path,
            id: key.to_owned(),
            stable: true,
        }
    }
}
