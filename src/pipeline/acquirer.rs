use std::time::Duration;

use tracing::{debug, info, warn};

use super::ProgressSink;
use crate::{
    cache::{AssetCache, CachedAsset},
    outside::{DownloadJob, DownloadReport, Extractor, LiveOptions},
    result::{Error, Result},
    types::{AcquisitionRequest, VideoIdentity, VideoMetadata},
};

/// The selector that matches whatever the site offers.
pub const BEST_AVAILABLE: &str = "best";

/// Ordered format selectors to try, the caller's preference first.
///
/// Duplicates are dropped and the ladder always ends with [`BEST_AVAILABLE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatLadder(Vec<String>);

impl FormatLadder {
    pub fn new(preferred: &str, fallbacks: &[String]) -> Self {
        let mut formats: Vec<String> = vec![];
        let candidates = std::iter::once(preferred)
            .chain(fallbacks.iter().map(String::as_str))
            .chain(std::iter::once(BEST_AVAILABLE));

        for format in candidates.map(str::trim).filter(|f| !f.is_empty()) {
            if !formats.iter().any(|f| f == format) {
                formats.push(format.to_owned());
            }
        }

        // `best` must stay the last resort even if listed earlier
        if formats.last().map(String::as_str) != Some(BEST_AVAILABLE) {
            formats.retain(|f| f != BEST_AVAILABLE);
            formats.push(BEST_AVAILABLE.to_owned());
        }

        Self(formats)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Drives the extraction service down the format ladder, then hands the
/// result to the cache.
pub struct Acquirer<'a> {
    extractor: &'a dyn Extractor,
    cache: &'a dyn AssetCache,
    fallback_formats: &'a [String],
    live_recording_limit: Duration,
    /// Pause before looking for the file, the service may still be renaming it
    settle_delay: Duration,
    progress: &'a ProgressSink,
}

impl<'a> Acquirer<'a> {
    pub fn new(
        extractor: &'a dyn Extractor,
        cache: &'a dyn AssetCache,
        fallback_formats: &'a [String],
        live_recording_limit: Duration,
        settle_delay: Duration,
        progress: &'a ProgressSink,
    ) -> Self {
        Self {
            extractor,
            cache,
            fallback_formats,
            live_recording_limit,
            settle_delay,
            progress,
        }
    }

    /// Download the video into the cache and return the admitted asset.
    pub fn acquire(
        &self,
        request: &AcquisitionRequest,
        identity: &VideoIdentity,
        metadata: &VideoMetadata,
    ) -> Result<CachedAsset> {
        let ladder = FormatLadder::new(&request.quality, self.fallback_formats);
        let live = LiveOptions::for_video(
            metadata.is_live(),
            request.live_from_start,
            self.live_recording_limit,
        );
        if metadata.is_live() {
            info!("{metadata} is live, recording with {live:?}");
        }

        let report = self.download(&request.url, identity, &ladder, live)?;

        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }

        let asset = self.cache.put(identity, report.completed_path.as_deref())?;
        info!("Downloaded '{identity}' to '{}'", asset.path.display());
        Ok(asset)
    }

    /// Try every format of the ladder until one downloads.
    ///
    /// Unavailable formats and refused requests move on to the next format,
    /// any other failure stops right away.
    pub fn download(
        &self,
        url: &str,
        identity: &VideoIdentity,
        ladder: &FormatLadder,
        live: LiveOptions,
    ) -> Result<DownloadReport> {
        let template = self.cache.download_template(identity);
        let mut last_failure = None;

        for (i, format) in ladder.iter().enumerate() {
            info!(
                "Downloading '{identity}' with format '{format}' ({}/{})",
                i + 1,
                ladder.len()
            );

            let job = DownloadJob {
                url,
                format,
                output_template: &template,
                live,
            };

            match self.extractor.download(&job, self.progress) {
                Ok(report) => {
                    debug!("Format '{format}' succeeded: {report:?}");
                    return Ok(report);
                }
                Err(failure) if failure.kind.is_retryable() => {
                    warn!("Format '{format}' failed ({:?}): {failure}", failure.kind);
                    last_failure = Some(failure);
                }
                Err(failure) => {
                    return Err(Error::DownloadFailed(format!(
                        "format '{format}': {failure}"
                    )))
                }
            }
        }

        Err(Error::AcquisitionExhausted(
            last_failure.map_or_else(|| "no format to try".to_owned(), |f| f.message),
        ))
    }
}
