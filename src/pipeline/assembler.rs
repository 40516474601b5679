use std::{
    fmt::Display,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{debug, error, info};

use super::{probe_metadata, Acquirer, ProgressSink, Stitcher, Trimmer};
use crate::{
    cache::{is_partial_name, AssetCache, CachedAsset},
    outside::{Extractor, MediaTool},
    result::{Error, Result},
    types::{
        validate_output_path, AcquisitionOutcome, AcquisitionRequest, RangeSelection,
        VideoIdentity, VideoMetadata,
    },
};

/// Steps of an acquisition, logged as it moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    MetadataProbed,
    CacheChecked,
    CacheHit,
    Acquiring,
    FileLocated,
    Copying,
    Trimming,
    Stitching,
    Verified,
    Succeeded,
    Failed,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::MetadataProbed => "metadata probed",
            Stage::CacheChecked => "cache checked",
            Stage::CacheHit => "cache hit",
            Stage::Acquiring => "acquiring",
            Stage::FileLocated => "file located",
            Stage::Copying => "copying",
            Stage::Trimming => "trimming",
            Stage::Stitching => "stitching",
            Stage::Verified => "verified",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub fallback_formats: Vec<String>,
    pub live_recording_limit: Duration,
    pub settle_delay: Duration,
}

/// The acquisition pipeline, from the URL to the verified destination file.
pub struct Engine<'a> {
    extractor: &'a dyn Extractor,
    tool: &'a dyn MediaTool,
    cache: &'a dyn AssetCache,
    options: EngineOptions,
    progress: ProgressSink,
}

/// What the pipeline learned before it stopped, kept for the outcome.
#[derive(Debug, Default)]
struct Trail {
    metadata: Option<VideoMetadata>,
    cached_asset: Option<PathBuf>,
}

impl<'a> Engine<'a> {
    pub fn new(
        extractor: &'a dyn Extractor,
        tool: &'a dyn MediaTool,
        cache: &'a dyn AssetCache,
        options: EngineOptions,
        progress: ProgressSink,
    ) -> Self {
        Self {
            extractor,
            tool,
            cache,
            options,
            progress,
        }
    }

    /// Metadata of the video, nothing downloaded.
    pub fn probe(&self, url: &str) -> Result<VideoMetadata> {
        probe_metadata(self.extractor, url)
    }

    /// Acquire the video, through the cache, and place the requested part of it
    /// at the destination.
    pub fn acquire(&self, request: &AcquisitionRequest) -> AcquisitionOutcome {
        self.acquire_inner(request, None)
    }

    /// Same as [`Engine::acquire`] for a video whose metadata was already probed.
    pub fn acquire_probed(
        &self,
        request: &AcquisitionRequest,
        metadata: VideoMetadata,
    ) -> AcquisitionOutcome {
        self.acquire_inner(request, Some(metadata))
    }

    fn acquire_inner(
        &self,
        request: &AcquisitionRequest,
        probed: Option<VideoMetadata>,
    ) -> AcquisitionOutcome {
        let mut trail = Trail::default();
        let mut stage = Stage::Start;

        match self.run_acquire(request, probed, &mut trail, &mut stage) {
            Ok((path, size)) => {
                advance(&mut stage, Stage::Succeeded);
                AcquisitionOutcome::succeeded(path, size, trail.metadata, trail.cached_asset)
            }
            Err(err) => {
                error!("Acquisition of '{}' failed while {stage}: {err}", request.url);
                advance(&mut stage, Stage::Failed);
                AcquisitionOutcome::failed(&err, trail.metadata, trail.cached_asset)
            }
        }
    }

    /// Cut or copy a local file, without the extraction service.
    pub fn trim_local(
        &self,
        input: &Path,
        output: &Path,
        selection: &RangeSelection,
    ) -> AcquisitionOutcome {
        let mut stage = Stage::FileLocated;

        let res = local_identity(input).and_then(|identity| {
            self.place(input, selection, output, &identity, &mut stage)?;
            let size = verify_destination(output)?;
            advance(&mut stage, Stage::Verified);
            Ok(size)
        });

        match res {
            Ok(size) => {
                advance(&mut stage, Stage::Succeeded);
                AcquisitionOutcome::succeeded(output.to_path_buf(), size, None, None)
            }
            Err(err) => {
                error!("Cutting '{}' failed while {stage}: {err}", input.display());
                advance(&mut stage, Stage::Failed);
                AcquisitionOutcome::failed(&err, None, None)
            }
        }
    }

    fn run_acquire(
        &self,
        request: &AcquisitionRequest,
        probed: Option<VideoMetadata>,
        trail: &mut Trail,
        stage: &mut Stage,
    ) -> Result<(PathBuf, u64)> {
        validate_output_path(&request.destination)?;

        let metadata = match probed {
            Some(metadata) => metadata,
            None => self.probe(&request.url)?,
        };
        trail.metadata = Some(metadata.clone());
        advance(stage, Stage::MetadataProbed);
        info!("Acquiring {metadata}");

        let identity = VideoIdentity::new(metadata.id.as_str())?;

        let cached = self.cache.get(&identity);
        advance(stage, Stage::CacheChecked);

        let asset = match cached {
            Some(asset) => {
                advance(stage, Stage::CacheHit);
                info!("Using cached '{}'", asset.path.display());
                if !self.cache.verify(&asset.path) {
                    return Err(Error::CacheAssetInvalid(format!(
                        "'{}' vanished or changed",
                        asset.path.display()
                    )));
                }
                asset
            }
            None => {
                advance(stage, Stage::Acquiring);
                let asset = self.acquirer().acquire(request, &identity, &metadata)?;
                advance(stage, Stage::FileLocated);
                asset
            }
        };
        trail.cached_asset = Some(asset.path.clone());

        self.place_asset(&asset, request, &identity, stage)?;

        let size = verify_destination(&request.destination)?;
        advance(stage, Stage::Verified);
        Ok((request.destination.clone(), size))
    }

    fn acquirer(&self) -> Acquirer<'_> {
        Acquirer::new(
            self.extractor,
            self.cache,
            &self.options.fallback_formats,
            self.options.live_recording_limit,
            self.options.settle_delay,
            &self.progress,
        )
    }

    fn place_asset(
        &self,
        asset: &CachedAsset,
        request: &AcquisitionRequest,
        identity: &VideoIdentity,
        stage: &mut Stage,
    ) -> Result<()> {
        self.place(&asset.path, &request.selection, &request.destination, identity, stage)
    }

    /// Copy, cut, or cut and join the source into the destination.
    ///
    /// The source is only ever read.
    fn place(
        &self,
        source: &Path,
        selection: &RangeSelection,
        destination: &Path,
        identity: &VideoIdentity,
        stage: &mut Stage,
    ) -> Result<()> {
        match selection {
            RangeSelection::Full => {
                advance(stage, Stage::Copying);
                copy_file(source, destination)
            }
            RangeSelection::Single(spec) => {
                advance(stage, Stage::Trimming);
                Trimmer::new(self.tool).trim(source, destination, spec)
            }
            RangeSelection::Multi(specs) => {
                advance(stage, Stage::Stitching);
                Stitcher::new(self.tool, self.cache.root())
                    .stitch(source, specs, destination, identity)
            }
        }
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!("{stage} -> {next}");
    *stage = next;
}

/// Name temporaries of a local cut after the input file.
fn local_identity(input: &Path) -> Result<VideoIdentity> {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    VideoIdentity::new(stem).or_else(|_| VideoIdentity::new("local"))
}

fn copy_file(source: &Path, destination: &Path) -> Result<()> {
    if !source.is_file() {
        return Err(Error::CacheAssetInvalid(format!(
            "'{}' does not exist",
            source.display()
        )));
    }
    validate_output_path(destination)?;

    // Copying a file onto itself would truncate it
    let same = match (source.canonicalize(), destination.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if same {
        debug!("'{}' is already in place", destination.display());
        return Ok(());
    }

    let copied = std::fs::copy(source, destination).map_err(|err| {
        Error::InvalidOutputPath(format!(
            "could not copy '{}' to '{}': {err}",
            source.display(),
            destination.display()
        ))
    })?;
    info!("Copied {copied} bytes to '{}'", destination.display());
    Ok(())
}

/// The destination must be a non-empty regular file, with no partial download
/// marker anywhere in its path.
fn verify_destination(destination: &Path) -> Result<u64> {
    let partial = destination
        .components()
        .any(|c| is_partial_name(&c.as_os_str().to_string_lossy()));
    if partial {
        return Err(Error::VerificationFailed(format!(
            "'{}' is a partial download",
            destination.display()
        )));
    }

    match std::fs::metadata(destination) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
        Ok(_) => Err(Error::VerificationFailed(format!(
            "'{}' is empty or not a file",
            destination.display()
        ))),
        Err(err) => Err(Error::VerificationFailed(format!(
            "'{}' is missing: {err}",
            destination.display()
        ))),
    }
}
