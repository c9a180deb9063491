//! digitrace-bench: CLI tool for digitizing a curve and inspecting the
//! pipeline's per-stage diagnostics.
//!
//! Reads a chart image and a guide trace (JSON), runs the pipeline with
//! the built-in contour vectorizer, and prints the digitized points.
//! Useful for:
//!
//! - Tuning the filter tolerances against real charts
//! - Seeing which stage removed a line that should have been found
//! - Measuring per-stage durations
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin digitrace-bench -- [OPTIONS] <IMAGE_PATH> <TRACE_JSON>
//! ```
//!
//! The trace file holds `{"points": [{"x": .., "y": ..}, ..], "pen_width": 40}`;
//! `pen_width` may be omitted.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use digitrace_pipeline::diagnostics::{Clock, PipelineDiagnostics, StageMetrics};
use digitrace_pipeline::{
    ContourVectorizer, DigitizeConfig, DigitizedPoints, Digitizer, FilterStage, GuideTrace,
    NoProgress, Point,
};
use serde::{Deserialize, Serialize};

/// Digitize one curve from a chart image, guided by a rough trace.
///
/// Prints the digitized points on stdout (one `x,y` pair per line) and
/// per-stage timing and count diagnostics on stderr.
#[derive(Parser)]
#[command(name = "digitrace-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Path to the guide trace JSON.
    trace_path: PathBuf,

    /// Pen width in pixels (overrides the trace file).
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    pen_width: Option<u32>,

    /// Minimum path length in pixels.
    #[arg(long, default_value_t = DigitizeConfig::DEFAULT_MIN_LENGTH)]
    min_length: f64,

    /// Fraction of a path's length that must lie inside the corridor.
    #[arg(long, default_value_t = DigitizeConfig::DEFAULT_INSIDE_FRACTION)]
    inside_fraction: f64,

    /// Luminance below which a pixel counts as ink.
    #[arg(long, default_value_t = DigitizeConfig::DEFAULT_INK_THRESHOLD)]
    ink_threshold: u8,

    /// Truncate output coordinates to whole pixels.
    #[arg(long)]
    snap: bool,

    /// Vectorize the whole image instead of the area around the trace.
    #[arg(long)]
    no_crop: bool,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Print points and diagnostics as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Full digitizer config as a JSON string.
    ///
    /// When provided, all other tolerance flags are ignored.
    /// The JSON must be a valid `DigitizeConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

/// On-disk guide trace; the pen width is optional.
#[derive(Deserialize)]
struct TraceFile {
    points: Vec<Point>,
    #[serde(default)]
    pen_width: Option<u32>,
}

/// JSON output of a whole invocation.
#[derive(Serialize)]
struct Output<'a> {
    points: &'a DigitizedPoints,
    diagnostics: &'a [PipelineDiagnostics],
}

/// Build a [`DigitizeConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual tolerance flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<DigitizeConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(DigitizeConfig {
        min_length: cli.min_length,
        inside_fraction: cli.inside_fraction,
        ink_threshold: cli.ink_threshold,
        snap_to_pixels: cli.snap,
        crop_margin: if cli.no_crop {
            None
        } else {
            Some(DigitizeConfig::DEFAULT_CROP_MARGIN)
        },
        ..DigitizeConfig::default()
    })
}

/// Load the guide trace, applying the pen width precedence
/// flag > file > default.
fn trace_from_cli(cli: &Cli) -> Result<GuideTrace, String> {
    let text = std::fs::read_to_string(&cli.trace_path)
        .map_err(|e| format!("Error reading {}: {e}", cli.trace_path.display()))?;
    let file: TraceFile = serde_json::from_str(&text)
        .map_err(|e| format!("Error parsing {}: {e}", cli.trace_path.display()))?;
    let pen_width = cli
        .pen_width
        .or(file.pen_width)
        .unwrap_or(DigitizeConfig::DEFAULT_PEN_WIDTH);
    Ok(GuideTrace::new(file.points, pen_width))
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let (config, trace) = match (config_from_cli(&cli), trace_from_cli(&cli)) {
        (Ok(config), Ok(trace)) => (config, trace),
        (Err(msg), _) | (_, Err(msg)) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image = match std::fs::read(&cli.image_path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| {
            digitrace_pipeline::decode_grayscale(&bytes).map_err(|e| e.to_string())
        }) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error loading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({}x{})",
        cli.image_path.display(),
        image.width(),
        image.height(),
    );
    eprintln!(
        "Trace: {} points, pen {}px",
        trace.points.len(),
        trace.pen_width
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let vectorizer = ContourVectorizer::from_config(&config);
    let mut digitizer = Digitizer::new(config);
    let mut all_diagnostics = Vec::with_capacity(cli.runs);
    let mut points = DigitizedPoints::default();

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match digitizer.run_with_diagnostics(&image, &vectorizer, &trace, NoProgress, &StdClock) {
            Ok((found, diagnostics)) => {
                if !cli.json {
                    eprintln!("{}", diagnostics.report());
                }
                points = found;
                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Digitizer error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    if cli.json {
        let output = Output {
            points: &points,
            diagnostics: &all_diagnostics,
        };
        match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing output: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        for p in points.points() {
            println!("{},{}", p.x, p.y);
        }
    }

    if points.is_empty() {
        log::warn!("no line found along the guide trace");
    }
    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Duration of the filter stage `stage`, if it ran.
fn filter_duration(d: &PipelineDiagnostics, stage: FilterStage) -> Option<Duration> {
    d.filters.iter().find_map(|s| match s.metrics {
        StageMetrics::Filter { stage: ran, .. } if ran == stage => Some(s.duration),
        _ => None,
    })
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    debug_assert!(!all_diagnostics.is_empty(), "no diagnostics to summarize");

    eprintln!();
    eprintln!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        eprintln!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    eprintln!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-stage means.
    eprintln!();
    eprintln!("{:<24} {:>12}", "Stage", "Mean (ms)");
    eprintln!("{}", "-".repeat(40));

    let mut stages: Vec<(&str, Box<dyn Fn(&PipelineDiagnostics) -> Option<Duration>>)> = vec![
        ("Vectorize", Box::new(|d: &PipelineDiagnostics| d.vectorize.as_ref().map(|s| s.duration))),
        ("Flatten", Box::new(|d: &PipelineDiagnostics| Some(d.flatten.duration))),
    ];
    for stage in FilterStage::ALL {
        stages.push((stage.label(), Box::new(move |d: &PipelineDiagnostics| filter_duration(d, stage))));
    }
    stages.push(("Join", Box::new(|d: &PipelineDiagnostics| d.join.as_ref().map(|s| s.duration))));

    for (name, extractor) in &stages {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(|d| extractor(d))
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        eprintln!("{name:<24} {stage_mean:>10.3}ms");
    }
}
