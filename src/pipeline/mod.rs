mod acquirer;
mod assembler;
mod probe;
mod progress;
mod stitcher;
#[cfg(test)]
pub(crate) mod testing;
mod trimmer;

pub use acquirer::{Acquirer, FormatLadder, BEST_AVAILABLE};
pub use assembler::{Engine, EngineOptions, Stage};
pub use probe::probe_metadata;
pub use progress::{ProgressEvent, ProgressSink};
pub use stitcher::{concat_manifest, Stitcher};
pub use trimmer::Trimmer;
