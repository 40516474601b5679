use std::{collections::BTreeMap, path::Path, path::PathBuf, time::Duration};

use config::{Config, Environment, File, FileFormat};
use miette::{Context, IntoDiagnostic, Result};
use serde::Deserialize;

use crate::{
    backoff::BackoffSettings,
    cache::{DirCache, StabilityPolicy},
    outside::YtdlOptions,
    pipeline::EngineOptions,
};

pub const DEFAULT_QUALITY: &str = "bestvideo+bestaudio/best";

/// Prefix of the environment variables overriding the settings.
pub const ENV_PREFIX: &str = "VIDSTASH";

/// Every recognized option, with its built-in default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Shared download and cache directory
    pub cache_dir: PathBuf,
    pub ytdlp_path: String,
    pub ffmpeg_path: String,
    /// Format preference used when the request names none
    pub quality: String,
    /// Selectors tried after the preferred one
    pub fallback_formats: Vec<String>,
    pub skip_cert_check: bool,
    pub retries: u32,
    pub fragment_retries: u32,
    pub file_access_retries: u32,
    pub sleep_interval: u32,
    pub max_sleep_interval: u32,
    pub sleep_requests: u32,
    pub player_clients: Vec<String>,
    pub headers: BTreeMap<String, String>,
    pub live_recording_limit_secs: u64,
    /// Bound of every trim and concat invocation
    pub tool_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub settle_delay_ms: u64,
    pub stability: StabilityPolicy,
    pub discovery: BackoffSettings,
    pub progress_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir(),
            ytdlp_path: "yt-dlp".to_owned(),
            ffmpeg_path: "ffmpeg".to_owned(),
            quality: DEFAULT_QUALITY.to_owned(),
            fallback_formats: vec![
                DEFAULT_QUALITY.to_owned(),
                "best[ext=mp4]/best[ext=webm]/best".to_owned(),
                "best".to_owned(),
            ],
            skip_cert_check: true,
            retries: 10,
            fragment_retries: 10,
            file_access_retries: 3,
            sleep_interval: 1,
            max_sleep_interval: 5,
            sleep_requests: 1,
            player_clients: vec!["android".to_owned(), "web".to_owned()],
            headers: BTreeMap::from([
                (
                    "User-Agent".to_owned(),
                    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                        .to_owned(),
                ),
                (
                    "Accept".to_owned(),
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_owned(),
                ),
                ("Accept-Language".to_owned(), "en-us,en;q=0.5".to_owned()),
            ]),
            live_recording_limit_secs: 3600,
            tool_timeout_secs: 3600,
            probe_timeout_secs: 120,
            settle_delay_ms: 500,
            stability: StabilityPolicy::default(),
            discovery: BackoffSettings::default(),
            progress_capacity: 64,
        }
    }
}

impl Settings {
    /// Load the settings, from lowest to highest priority: defaults,
    /// the optional TOML file, `VIDSTASH_*` variables, then `FFMPEG_PATH`.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_from(file, |key| std::env::var(key).ok(), None)
    }

    /// Same as [`Settings::load`] with an explicit environment.
    ///
    /// `env_source` replaces the process environment for the `VIDSTASH_*` variables
    /// when given, `legacy` looks up the other variables.
    pub(crate) fn load_from<F>(
        file: Option<&Path>,
        legacy: F,
        env_source: Option<std::collections::HashMap<String, String>>,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder();

        if let Some(file) = file {
            builder = builder.add_source(File::from(file).format(FileFormat::Toml).required(true));
        }

        let env = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("fallback_formats")
            .with_list_parse_key("player_clients")
            .source(env_source);
        builder = builder.add_source(env);

        builder = builder
            .set_override_option(
                "ffmpeg_path",
                legacy("FFMPEG_PATH").filter(|p| !p.trim().is_empty()),
            )
            .into_diagnostic()?;

        builder
            .build()
            .into_diagnostic()
            .wrap_err("Could not read the settings")?
            .try_deserialize()
            .into_diagnostic()
            .wrap_err("Invalid settings")
    }

    pub fn cache(&self) -> DirCache {
        DirCache::new(&self.cache_dir, self.stability, self.discovery.into())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn ytdl_options(&self) -> YtdlOptions {
        YtdlOptions {
            skip_cert_check: self.skip_cert_check,
            retries: self.retries,
            fragment_retries: self.fragment_retries,
            file_access_retries: self.file_access_retries,
            sleep_interval: self.sleep_interval,
            max_sleep_interval: self.max_sleep_interval,
            sleep_requests: self.sleep_requests,
            player_clients: self.player_clients.clone(),
            headers: self.headers.clone(),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            fallback_formats: self.fallback_formats.clone(),
            live_recording_limit: Duration::from_secs(self.live_recording_limit_secs),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }
}
