use std::path::Path;

use tracing::{debug, info};

use crate::{
    outside::MediaTool,
    result::{Error, Result},
    types::{validate_output_path, TrimSpec},
};

/// Copies one time range of a video with the media tool.
#[derive(Debug, Clone, Copy)]
pub struct Trimmer<'a> {
    tool: &'a dyn MediaTool,
}

impl<'a> Trimmer<'a> {
    pub fn new(tool: &'a dyn MediaTool) -> Self {
        Self { tool }
    }

    pub fn trim(&self, input: &Path, output: &Path, spec: &TrimSpec) -> Result<()> {
        if !input.is_file() {
            return Err(Error::TrimFailed(format!(
                "input file '{}' does not exist",
                input.display()
            )));
        }
        validate_output_path(output)?;

        let (seek, duration) = spec.seek_and_duration()?;
        debug!(
            "Cutting {spec} of '{}' (seek {seek:?}, duration {duration:?})",
            input.display()
        );
        self.tool.trim(input, output, seek, duration)?;

        let written = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(Error::TrimFailed(format!(
                "'{}' is missing or empty after cutting",
                output.display()
            )));
        }

        info!("Cut {spec} into '{}'", output.display());
        Ok(())
    }
}
