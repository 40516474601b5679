mod extension;
mod identity;
mod metadata;
mod request;
mod trim;

pub use extension::Extension;
pub use identity::{sanitize, VideoIdentity};
pub use metadata::{LiveState, RawVideoInfo, VideoMetadata};
pub use request::{is_supported_url, validate_output_path, AcquisitionOutcome, AcquisitionRequest};
pub use trim::{fmt_secs, parse_sections, RangeSelection, Seconds, TrimSpec};
