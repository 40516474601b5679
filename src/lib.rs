//! Acquire web videos through `yt-dlp`, keep full copies in a shared cache
//! keyed by video ID, and cut or stitch clips out of them with `ffmpeg`.

pub mod backoff;
pub mod cache;
pub mod cli;
pub mod config;
pub mod logging;
pub mod outside;
pub mod pipeline;
pub mod result;
pub mod types;

pub use cache::{AssetCache, CachedAsset, DirCache};
pub use config::Settings;
pub use pipeline::{Engine, EngineOptions, ProgressEvent, ProgressSink};
pub use result::{Error, ErrorKind, Result};
pub use types::{AcquisitionOutcome, AcquisitionRequest, RangeSelection, TrimSpec, VideoMetadata};
