use std::{
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::Trimmer;
use crate::{
    cache::CUT_MARKER,
    outside::MediaTool,
    result::{Error, Result},
    types::{validate_output_path, Extension, TrimSpec, VideoIdentity},
};

/// Cuts several ranges of a video and joins them back into one file.
#[derive(Debug)]
pub struct Stitcher<'a> {
    tool: &'a dyn MediaTool,
    /// Where the per-range cuts and the manifest are written
    temp_dir: &'a Path,
}

impl<'a> Stitcher<'a> {
    pub fn new(tool: &'a dyn MediaTool, temp_dir: &'a Path) -> Self {
        Self { tool, temp_dir }
    }

    /// Cut every range in order, then concatenate the cuts into `output`.
    ///
    /// Temporaries are named after the video with the cut marker, so that the
    /// cache never mistakes them for a full asset. They are removed whatever
    /// the outcome.
    pub fn stitch(
        &self,
        input: &Path,
        specs: &[TrimSpec],
        output: &Path,
        identity: &VideoIdentity,
    ) -> Result<()> {
        if specs.is_empty() {
            return Err(Error::StitchFailed("no sections to cut".to_owned()));
        }
        if !input.is_file() {
            return Err(Error::StitchFailed(format!(
                "input file '{}' does not exist",
                input.display()
            )));
        }
        validate_output_path(output)?;

        let mut temporaries = Vec::with_capacity(specs.len() + 1);
        let res = self.cut_and_join(input, specs, output, identity, &mut temporaries);

        for temp in temporaries {
            let path = temp.path().to_path_buf();
            match temp.close() {
                Ok(()) => debug!("Removed '{}'", path.display()),
                Err(err) => warn!("Could not remove temporary '{}': {err}", path.display()),
            }
        }

        res
    }

    fn cut_and_join(
        &self,
        input: &Path,
        specs: &[TrimSpec],
        output: &Path,
        identity: &VideoIdentity,
        temporaries: &mut Vec<NamedTempFile>,
    ) -> Result<()> {
        let extension = Extension::from_path(input).unwrap_or(Extension::Mp4);
        let trimmer = Trimmer::new(self.tool);
        let mut parts = Vec::with_capacity(specs.len());

        for (i, spec) in specs.iter().enumerate() {
            let part = self.temporary(identity, &format!("section_{i}"), extension.with_dot())?;
            let part_path = part.path().to_path_buf();
            temporaries.push(part);

            debug!("Section {}/{}: {spec}", i + 1, specs.len());
            trimmer
                .trim(input, &part_path, spec)
                .map_err(|err| Error::StitchFailed(format!("section {} ({spec}): {err}", i + 1)))?;
            parts.push(part_path);
        }

        let mut manifest = self.temporary(identity, "concat", ".txt")?;
        manifest
            .write_all(concat_manifest(&parts).as_bytes())
            .and_then(|()| manifest.flush())
            .map_err(|err| Error::StitchFailed(format!("could not write the concat list: {err}")))?;
        let manifest_path = manifest.path().to_path_buf();
        temporaries.push(manifest);

        self.tool
            .concat(&manifest_path, output)
            .map_err(|err| Error::StitchFailed(format!("could not join sections: {err}")))?;

        info!("Joined {} sections into '{}'", parts.len(), output.display());
        Ok(())
    }

    fn temporary(
        &self,
        identity: &VideoIdentity,
        label: &str,
        suffix: &str,
    ) -> Result<NamedTempFile> {
        tempfile::Builder::new()
            .prefix(&format!("{}{CUT_MARKER}{label}_", identity.sanitized()))
            .suffix(suffix)
            .tempfile_in(self.temp_dir)
            .map_err(|err| {
                Error::StitchFailed(format!(
                    "could not create a temporary file in '{}': {err}",
                    self.temp_dir.display()
                ))
            })
    }
}

/// Concat demuxer list of the parts: absolute paths with forward slashes,
/// single quotes escaped the way the demuxer expects.
pub fn concat_manifest(parts: &[PathBuf]) -> String {
    parts
        .iter()
        .map(|part| {
            let absolute = std::path::absolute(part).unwrap_or_else(|_| part.clone());
            let normalized = absolute.to_string_lossy().replace('\\', "/");
            format!("file '{}'\n", normalized.replace('\'', r"'\''"))
        })
        .collect()
}
