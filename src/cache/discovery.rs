use std::path::Path;

use tracing::{debug, info, warn};

use crate::{
    result::{Error, Result},
    types::VideoIdentity,
};

use super::{is_valid, CachedAsset, Candidate, DirCache};

impl DirCache {
    /// Locate the file a download just produced.
    ///
    /// The path reported by the extraction service is trusted first if it is
    /// still valid and stable. Otherwise the directory is searched for the
    /// most recently modified valid file named after the video, with
    /// backoff between searches since the service may still be renaming
    /// its partial files.
    pub fn discover(
        &self,
        identity: &VideoIdentity,
        completed: Option<&Path>,
    ) -> Result<CachedAsset> {
        if let Some(path) = completed {
            if is_valid(path) && self.stability.is_stable(path) {
                debug!("Using reported download path '{}'", path.display());
                if let Some(candidate) = Candidate::read(path.to_path_buf()) {
                    return Ok(candidate.into_asset(identity.sanitized()));
                }
            }
            warn!(
                "Reported download path '{}' is not usable, searching instead",
                path.display()
            );
        }

        let found = self.discovery.retry(|attempt| {
            debug!("Searching for '{identity}' download (attempt {})", attempt + 1);
            self.search_newest(identity)
        });

        if let Some(asset) = found {
            info!("Found downloaded file '{}'", asset.path.display());
            return Ok(asset);
        }

        let partials = self.list_partials(identity);
        if let Some(partial) = partials.first() {
            return Err(Error::IncompleteDownload(format!(
                "'{}'",
                partial.display()
            )));
        }

        Err(Error::FileNotFoundAfterAcquisition(format!(
            "no file for '{identity}' in '{}'",
            self.root.display()
        )))
    }

    /// Most recently modified valid file named after the video, if stable.
    fn search_newest(&self, identity: &VideoIdentity) -> Option<CachedAsset> {
        for key in identity.lookup_keys() {
            let newest = self
                .list_prefixed(key)
                .into_iter()
                .max_by(|a, b| a.modified.cmp(&b.modified));

            if let Some(candidate) = newest {
                if self.stability.is_stable(&candidate.path) {
                    return Some(candidate.into_asset(key));
                }
                debug!("'{}' is not stable yet", candidate.path.display());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        time::{Duration, SystemTime},
    };

    use tempfile::TempDir;

    use super::*;
    use crate::{cache::tests::quick_cache, result::ErrorKind};

    fn id(raw: &str) -> VideoIdentity {
        VideoIdentity::new(raw).unwrap()
    }

    fn set_mtime(path: &Path, secs: u64) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn uses_reported_path() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("video123.mp4");
        fs::write(&file, b"video data").unwrap();

        let asset = quick_cache(dir.path())
            .discover(&id("video123"), Some(&file))
            .unwrap();
        assert_eq!(asset.path, file);
    }

    #[test]
    fn falls_back_to_search_when_reported_path_is_gone() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("video123.mp4");
        fs::write(&file, b"video data").unwrap();

        let asset = quick_cache(dir.path())
            .discover(&id("video123"), Some(Path::new("/nonexistent/path/video.mp4")))
            .unwrap();
        assert_eq!(asset.path, file);
    }

    #[test]
    fn search_excludes_partial_and_cut_files() {
        let dir = TempDir::new().unwrap();
        let complete = dir.path().join("video123.mp4");
        fs::write(&complete, b"video data").unwrap();
        fs::write(dir.path().join("video123.part"), b"partial data").unwrap();
        fs::write(dir.path().join("video123_cut_123.mp4"), b"cut data").unwrap();

        let asset = quick_cache(dir.path())
            .discover(&id("video123"), None)
            .unwrap();
        assert_eq!(asset.path, complete);
    }

    #[test]
    fn search_takes_most_recent() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("video123_old.mp4");
        let new = dir.path().join("video123_new.mp4");
        fs::write(&old, b"old data").unwrap();
        fs::write(&new, b"new data").unwrap();
        set_mtime(&old, 1000);
        set_mtime(&new, 2000);

        let asset = quick_cache(dir.path())
            .discover(&id("video123"), None)
            .unwrap();
        assert_eq!(asset.path, new);
    }

    #[test]
    fn search_uses_sanitized_key() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("video123.webm");
        fs::write(&file, b"video data").unwrap();

        let asset = quick_cache(dir.path())
            .discover(&id("video:123"), None)
            .unwrap();
        assert_eq!(asset.path, file);
    }

    #[test]
    fn only_partial_is_incomplete() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("video123.mp4.part"), b"partial data").unwrap();

        let err = quick_cache(dir.path())
            .discover(&id("video123"), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompleteDownload);
    }

    #[test]
    fn nothing_is_not_found() {
        let dir = TempDir::new().unwrap();

        let err = quick_cache(dir.path())
            .discover(&id("nonexistent"), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFoundAfterAcquisition);
    }
}
