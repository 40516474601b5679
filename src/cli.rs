use std::path::PathBuf;

use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};

use crate::types::{parse_sections, RangeSelection, Seconds, TrimSpec};

macro_rules! arg_env {
    ($v:literal) => {
        concat!("VIDSTASH_", $v)
    };
}

/// Acquire web videos through `yt-dlp`, keep them in a shared cache,
/// and cut or stitch clips out of them with `ffmpeg`.
///
/// The result of every command is printed as one JSON object on stdout,
/// logs and progress events go to stderr.
#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// TOML file with the settings. Environment variables prefixed with
    /// `VIDSTASH_` override it
    #[arg(long, global = true, env = arg_env!("CONFIG"))]
    pub config: Option<PathBuf>,

    /// The shared cache directory, overriding the settings
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// More logs, can be repeated
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Less logs, can be repeated
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub quiet: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a video (or reuse the cached copy) and write it, or a part of it,
    /// to the output file
    Acquire {
        /// The video URL
        url: String,

        /// The destination file
        #[arg(short, long)]
        output: PathBuf,

        /// The format selector to try first. Defaults to the configured quality
        #[arg(long)]
        quality: Option<String>,

        #[command(flatten)]
        range: RangeArgs,

        /// Record a live stream from its beginning instead of its live edge
        #[arg(long)]
        live_from_start: bool,
    },

    /// Print the video metadata without downloading anything
    Probe {
        /// The video URL
        url: String,
    },

    /// Cut or stitch a local file, without downloading anything
    Trim {
        input: PathBuf,
        output: PathBuf,

        #[command(flatten)]
        range: RangeArgs,
    },
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct RangeArgs {
    /// Start of the clip, in seconds or `[HH:]MM:SS`
    #[arg(long)]
    pub start: Option<Seconds>,

    /// End of the clip, in seconds or `[HH:]MM:SS`
    #[arg(long)]
    pub end: Option<Seconds>,

    /// Several clips to join, as a JSON list: `[{"start": 10, "end": 30}, ...]`.
    /// Takes precedence over `--start` and `--end`
    #[arg(long)]
    pub sections: Option<String>,
}

impl RangeArgs {
    /// The selection the arguments describe.
    ///
    /// The error is a message meant for the JSON result.
    pub fn selection(&self) -> Result<RangeSelection, String> {
        let sections = self
            .sections
            .as_deref()
            .map(|json| parse_sections(json).map_err(|err| format!("Invalid sections JSON: {err}")))
            .transpose()?;

        let single = TrimSpec::new(self.start.map(|s| s.0), self.end.map(|s| s.0));

        Ok(RangeSelection::resolve(Some(single), sections))
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn arguments_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn acquire_with_a_range() {
        let args = Args::try_parse_from([
            "vidstash",
            "-v",
            "acquire",
            "https://youtu.be/abc123",
            "-o",
            "out.mp4",
            "--start",
            "10",
            "--end",
            "0:30",
        ])
        .unwrap();

        assert_eq!(args.verbose, 1);
        let Command::Acquire { url, output, range, .. } = args.command else {
            panic!("not an acquire command");
        };
        assert_eq!(url, "https://youtu.be/abc123");
        assert_eq!(output, PathBuf::from("out.mp4"));
        assert_eq!(
            range.selection().unwrap(),
            RangeSelection::Single(TrimSpec::new(Some(10.0), Some(30.0)))
        );
    }

    #[test]
    fn sections_win_over_the_single_range() {
        let range = RangeArgs {
            start: Some(Seconds(1.0)),
            end: Some(Seconds(2.0)),
            sections: Some(r#"[{"start": 10, "end": 30}, {"start": 50, "end": 70}]"#.to_owned()),
        };

        assert_eq!(
            range.selection().unwrap(),
            RangeSelection::Multi(vec![
                TrimSpec::new(Some(10.0), Some(30.0)),
                TrimSpec::new(Some(50.0), Some(70.0)),
            ])
        );
    }

    #[test]
    fn malformed_sections_mention_json() {
        let range = RangeArgs {
            sections: Some("[invalid json".to_owned()),
            ..Default::default()
        };
        assert!(range.selection().unwrap_err().contains("JSON"));
    }

    #[test]
    fn no_range_is_a_full_copy() {
        assert_eq!(RangeArgs::default().selection().unwrap(), RangeSelection::Full);
    }

    #[test]
    fn global_options_after_the_subcommand() {
        let args = Args::try_parse_from([
            "vidstash",
            "trim",
            "in.mp4",
            "out.mp4",
            "--cache-dir",
            "/tmp/cache",
            "-qq",
        ])
        .unwrap();
        assert_eq!(args.quiet, 2);
        assert_eq!(args.cache_dir, Some(PathBuf::from("/tmp/cache")));
        assert!(matches!(args.command, Command::Trim { .. }));
    }
}
