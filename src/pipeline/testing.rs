//! In-memory stand-ins for the external collaborators.

use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::{
    outside::{
        DownloadFailure, DownloadJob, DownloadReport, Extractor, FailureKind, LiveOptions,
        MediaTool,
    },
    pipeline::ProgressSink,
    result::{Error, Result},
    types::{LiveState, VideoMetadata},
};

pub(crate) fn metadata(id: &str) -> VideoMetadata {
    VideoMetadata {
        id: id.to_owned(),
        title: format!("Video {id}"),
        duration: Some(120),
        live_state: LiveState::None,
        scheduled_start: None,
        thumbnail: None,
        uploader: Some("Uploader".to_owned()),
        view_count: Some(1000),
        upload_date: Some("20240101".to_owned()),
    }
}

/// Extractor answering download attempts from a script, one entry per attempt.
///
/// A successful attempt writes `produced` next to the output template.
#[derive(Debug)]
pub(crate) struct ScriptedExtractor {
    pub metadata: Option<VideoMetadata>,
    pub produced: Option<(String, Vec<u8>)>,
    script: Mutex<VecDeque<std::result::Result<(), FailureKind>>>,
    pub formats: Mutex<Vec<String>>,
    pub lives: Mutex<Vec<LiveOptions>>,
}

impl ScriptedExtractor {
    pub fn new(metadata: Option<VideoMetadata>) -> Self {
        Self {
            metadata,
            produced: None,
            script: Mutex::new(VecDeque::new()),
            formats: Mutex::new(vec![]),
            lives: Mutex::new(vec![]),
        }
    }

    pub fn producing(mut self, name: &str, data: &[u8]) -> Self {
        self.produced = Some((name.to_owned(), data.to_vec()));
        self
    }

    pub fn then(self, outcome: std::result::Result<(), FailureKind>) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn attempts(&self) -> Vec<String> {
        self.formats.lock().unwrap().clone()
    }

    /// Live options of every attempt, in order.
    pub fn live_options(&self) -> Vec<LiveOptions> {
        self.lives.lock().unwrap().clone()
    }
}

impl Extractor for ScriptedExtractor {
    fn probe(&self, url: &str) -> Result<VideoMetadata> {
        self.metadata
            .clone()
            .ok_or_else(|| Error::MetadataUnavailable(format!("no metadata for {url}")))
    }

    fn download(
        &self,
        job: &DownloadJob<'_>,
        _progress: &ProgressSink,
    ) -> std::result::Result<DownloadReport, DownloadFailure> {
        self.formats.lock().unwrap().push(job.format.to_owned());
        self.lives.lock().unwrap().push(job.live);

        match self.script.lock().unwrap().pop_front().unwrap_or(Ok(())) {
            Ok(()) => {
                let mut report = DownloadReport::default();
                if let Some((name, data)) = &self.produced {
                    let dir = job.output_template.parent().unwrap_or(Path::new("."));
                    let path = dir.join(name);
                    fs::write(&path, data).unwrap();
                    report.completed_path = Some(path);
                }
                Ok(report)
            }
            Err(kind) => Err(DownloadFailure::new(kind, format!("scripted {kind:?} failure"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TrimCall {
    pub input: PathBuf,
    pub output: PathBuf,
    pub seek: Option<f64>,
    pub duration: Option<f64>,
}

/// Media tool recording its calls and writing small files as outputs.
#[derive(Debug, Default)]
pub(crate) struct RecordingTool {
    /// 1-based index of the trim call that fails
    pub fail_trim_on: Option<usize>,
    pub fail_concat: bool,
    pub trims: Mutex<Vec<TrimCall>>,
    pub manifests: Mutex<Vec<String>>,
}

impl RecordingTool {
    pub fn trims(&self) -> Vec<TrimCall> {
        self.trims.lock().unwrap().clone()
    }

    pub fn manifests(&self) -> Vec<String> {
        self.manifests.lock().unwrap().clone()
    }
}

impl MediaTool for RecordingTool {
    fn trim(
        &self,
        input: &Path,
        output: &Path,
        seek: Option<f64>,
        duration: Option<f64>,
    ) -> Result<()> {
        let mut trims = self.trims.lock().unwrap();
        trims.push(TrimCall {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            seek,
            duration,
        });

        if self.fail_trim_on == Some(trims.len()) {
            return Err(Error::ToolInvocationFailed("ffmpeg exited with 1".to_owned()));
        }
        fs::write(output, format!("clip {}", trims.len())).unwrap();
        Ok(())
    }

    fn concat(&self, manifest: &Path, output: &Path) -> Result<()> {
        self.manifests
            .lock()
            .unwrap()
            .push(fs::read_to_string(manifest).unwrap());

        if self.fail_concat {
            return Err(Error::ToolInvocationFailed("concat exited with 1".to_owned()));
        }
        fs::write(output, b"joined clips").unwrap();
        Ok(())
    }
}
