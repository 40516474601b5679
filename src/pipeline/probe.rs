use tracing::{debug, warn};

use crate::{
    outside::Extractor,
    result::{Error, Result},
    types::VideoMetadata,
};

/// Ask the extraction service for the video metadata, once.
///
/// Every failure comes out as [`Error::MetadataUnavailable`], whatever
/// went wrong underneath.
pub fn probe_metadata(extractor: &dyn Extractor, url: &str) -> Result<VideoMetadata> {
    debug!("Probing '{url}'");

    match extractor.probe(url) {
        Ok(metadata) => {
            debug!("Probed {metadata}");
            Ok(metadata)
        }
        Err(err) => {
            warn!("Could not probe '{url}': {err}");
            Err(match err {
                err @ Error::MetadataUnavailable(_) => err,
                err => Error::MetadataUnavailable(err.detail().to_owned()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        outside::{DownloadFailure, DownloadJob, DownloadReport},
        pipeline::{
            testing::{metadata, ScriptedExtractor},
            ProgressSink,
        },
        result::ErrorKind,
    };

    #[test]
    fn returns_the_metadata() {
        let extractor = ScriptedExtractor::new(Some(metadata("abc123")));
        let probed = probe_metadata(&extractor, "https://youtu.be/abc123").unwrap();
        assert_eq!(probed.id, "abc123");
    }

    #[test]
    fn every_failure_is_unavailable_metadata() {
        #[derive(Debug)]
        struct Broken;

        impl Extractor for Broken {
            fn probe(&self, _url: &str) -> Result<VideoMetadata> {
                Err(Error::ToolInvocationFailed("yt-dlp timed out".to_owned()))
            }

            fn download(
                &self,
                _job: &DownloadJob<'_>,
                _progress: &ProgressSink,
            ) -> std::result::Result<DownloadReport, DownloadFailure> {
                unreachable!()
            }
        }

        let err = probe_metadata(&Broken, "https://youtu.be/x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MetadataUnavailable);
        assert!(err.to_string().contains("timed out"));

        let err = probe_metadata(&ScriptedExtractor::new(None), "https://youtu.be/x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MetadataUnavailable);
    }
}
