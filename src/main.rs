use std::{
    io::Write,
    path::Path,
    process::ExitCode,
    thread::{self, JoinHandle},
};

use clap::Parser;
use crossbeam_channel::Receiver;
use miette::{IntoDiagnostic, Result, WrapErr};
use serde_json::{json, Value};
use tracing::{debug, info};

use vidstash::{
    cli::{Args, Command, RangeArgs},
    logging::{init_logging, level_from_verbosity},
    outside::{Ffmpeg, Ytdl},
    pipeline::{probe_metadata, Engine, ProgressEvent, ProgressSink},
    types::{is_supported_url, AcquisitionOutcome, AcquisitionRequest, RangeSelection},
    DirCache, Error, Settings,
};

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(level_from_verbosity(args.verbose, args.quiet))?;

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(dir) = &args.cache_dir {
        settings.cache_dir = dir.clone();
    }
    debug!("{settings:?}");

    let report = match &args.command {
        Command::Probe { url } => probe(&settings, url),
        Command::Acquire {
            url,
            output,
            quality,
            range,
            live_from_start,
        } => {
            let quality = quality.as_deref().unwrap_or(&settings.quality);
            acquire(&settings, url, output, quality, range, *live_from_start)?
        }
        Command::Trim {
            input,
            output,
            range,
        } => trim(&settings, input, output, range)?,
    };

    let success = report["success"].as_bool().unwrap_or(false);

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &report)
        .into_diagnostic()
        .wrap_err("Could not print the result")?;
    writeln!(stdout).into_diagnostic()?;

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn probe(settings: &Settings, url: &str) -> Value {
    if !is_supported_url(url) {
        return invalid_url();
    }

    let ytdl = Ytdl::new(&settings.ytdlp_path, settings.ytdl_options());
    match probe_metadata(&ytdl, url) {
        Ok(metadata) => json!({ "success": true, "video_info": metadata }),
        Err(err) => failure(&err),
    }
}

fn acquire(
    settings: &Settings,
    url: &str,
    output: &Path,
    quality: &str,
    range: &RangeArgs,
    live_from_start: bool,
) -> Result<Value> {
    if !is_supported_url(url) {
        return Ok(invalid_url());
    }
    let selection = match range.selection() {
        Ok(selection) => selection,
        Err(msg) => return Ok(json!({ "success": false, "error_message": msg })),
    };
    let ffmpeg = match media_tool(settings) {
        Ok(ffmpeg) => ffmpeg,
        Err(err) => return Ok(failure(&err)),
    };
    let ytdl = Ytdl::new(&settings.ytdlp_path, settings.ytdl_options());
    let cache = open_cache(settings)?;

    let (sink, receiver) = ProgressSink::bounded(settings.progress_capacity);
    let printer = spawn_progress_printer(receiver)?;

    let report = {
        // The engine owns the last sender: the printer stops once it is dropped
        let engine = Engine::new(&ytdl, &ffmpeg, &cache, settings.engine_options(), sink);

        match engine.probe(url) {
            Err(err) => to_value(&AcquisitionOutcome::failed(&err, None, None))?,
            Ok(metadata) if metadata.is_scheduled() => {
                info!("{metadata} has not started yet, nothing to download");
                json!({
                    "success": true,
                    "scheduled": true,
                    "message": "Video is scheduled. Will download when stream starts.",
                    "video_info": metadata,
                })
            }
            Ok(metadata) => {
                let request = AcquisitionRequest::new(url, output)
                    .with_quality(quality)
                    .with_selection(selection)
                    .with_live_from_start(live_from_start);
                to_value(&engine.acquire_probed(&request, metadata))?
            }
        }
    };

    if printer.join().is_err() {
        debug!("The progress printer panicked");
    }
    Ok(report)
}

fn trim(settings: &Settings, input: &Path, output: &Path, range: &RangeArgs) -> Result<Value> {
    let selection = match range.selection() {
        Ok(selection) => selection,
        Err(msg) => return Ok(json!({ "success": false, "error_message": msg })),
    };
    let ffmpeg = match media_tool(settings) {
        Ok(ffmpeg) => ffmpeg,
        Err(err) => return Ok(failure(&err)),
    };
    // Never called, a local cut does not download
    let ytdl = Ytdl::new(&settings.ytdlp_path, settings.ytdl_options());
    let cache = open_cache(settings)?;

    let engine = Engine::new(
        &ytdl,
        &ffmpeg,
        &cache,
        settings.engine_options(),
        ProgressSink::disabled(),
    );

    if selection == RangeSelection::Full {
        info!("No range given, copying the whole file");
    }
    to_value(&engine.trim_local(input, output, &selection))
}

fn media_tool(settings: &Settings) -> vidstash::Result<Ffmpeg> {
    let ffmpeg = Ffmpeg::new(&settings.ffmpeg_path, settings.tool_timeout())?;
    debug!("Using ffmpeg at '{}'", ffmpeg.program().display());
    Ok(ffmpeg)
}

fn open_cache(settings: &Settings) -> Result<DirCache> {
    settings
        .cache()
        .create()
        .into_diagnostic()
        .wrap_err_with(|| {
            format!(
                "Could not create the cache directory '{}'",
                settings.cache_dir.display()
            )
        })
}

/// Print every progress event as a JSON line on stderr until the channel closes.
fn spawn_progress_printer(receiver: Receiver<ProgressEvent>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("progress".to_owned())
        .spawn(move || {
            let mut stderr = std::io::stderr();
            for event in receiver {
                if let Ok(line) = serde_json::to_string(&event) {
                    // Nothing sensible to do if stderr is gone
                    let _ = writeln!(stderr, "{line}");
                }
            }
        })
        .into_diagnostic()
        .wrap_err("Could not start the progress printer")
}

fn invalid_url() -> Value {
    json!({ "success": false, "error_message": "Invalid YouTube URL" })
}

fn failure(err: &Error) -> Value {
    json!({
        "success": false,
        "error_kind": err.kind(),
        "error_message": err.to_string(),
    })
}

fn to_value(outcome: &AcquisitionOutcome) -> Result<Value> {
    serde_json::to_value(outcome)
        .into_diagnostic()
        .wrap_err("Could not serialize the result")
}
