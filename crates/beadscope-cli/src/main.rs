//! Command-line driver for the bead detection pipeline.
//!
//! Thin wiring only: argument parsing, config/override file loading, a
//! `tracing_subscriber` install, and the exit-code mapping. The algorithmic
//! work all lives in `beadscope-core`; this binary never touches OpenCV
//! directly.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Deserialize;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use beadscope_core::geometry::GeometryOverride;
use beadscope_core::preprocess::{DenoiseMode, GlareMode};
use beadscope_core::{run, CancellationToken, PipelineConfig, PipelineError, ProgressEvent, RunOptions};

#[derive(Parser, Debug)]
#[command(name = "beadscope", about = "Detect and track grinding media in mill drum video")]
struct Args {
    /// Input video file.
    video: PathBuf,

    /// Where to write the results cache (defaults to `<video>.beadscope.json`).
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Optional JSON file overriding `PipelineConfig` defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Optional calibration override file: `{px_per_mm, source, last_updated}`.
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Optional geometry override file: `{center_x_px, center_y_px, radius_px}`.
    #[arg(long)]
    geometry: Option<PathBuf>,

    /// Stop after this many frames.
    #[arg(long)]
    limit: Option<u64>,

    #[arg(long, value_enum, default_value_t = DenoiseArg::Bilateral)]
    denoise: DenoiseArg,

    #[arg(long, value_enum, default_value_t = GlareArg::None)]
    glare: GlareArg,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum DenoiseArg {
    Bilateral,
    Gaussian,
    Median,
}

impl From<DenoiseArg> for DenoiseMode {
    fn from(v: DenoiseArg) -> Self {
        match v {
            DenoiseArg::Bilateral => DenoiseMode::Bilateral,
            DenoiseArg::Gaussian => DenoiseMode::Gaussian,
            DenoiseArg::Median => DenoiseMode::Median,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum GlareArg {
    None,
    Cap,
    Inpaint,
}

impl From<GlareArg> for GlareMode {
    fn from(v: GlareArg) -> Self {
        match v {
            GlareArg::None => GlareMode::None,
            GlareArg::Cap => GlareMode::Cap,
            GlareArg::Inpaint => GlareMode::Inpaint,
        }
    }
}

/// Distinct from the geometry override: wins for `px_per_mm` only.
#[derive(Debug, Deserialize)]
struct CalibrationOverride {
    px_per_mm: f64,
    source: String,
    #[allow(dead_code)]
    last_updated: String,
}

/// `{center_x_px, center_y_px, radius_px, rim_margin_px?, source?}`; presence
/// forces the solver to skip ROI/centre detection.
#[derive(Debug, Deserialize)]
struct GeometryOverrideFile {
    center_x_px: i32,
    center_y_px: i32,
    radius_px: i32,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("beadscope=info".parse().unwrap()))
        .init();

    let args = Args::parse();
    match run_cli(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn run_cli(args: Args) -> Result<(), PipelineError> {
    if !args.video.exists() {
        return Err(PipelineError::VideoNotFound(args.video.clone()));
    }

    let cfg = load_config(args.config.as_deref())?;
    cfg.validate()?;

    let geometry_override = load_geometry_override(args.geometry.as_deref(), args.calibration.as_deref())?;

    let cache_path = args
        .cache
        .clone()
        .unwrap_or_else(|| args.video.with_extension("beadscope.json"));

    let cancellation = CancellationToken::new();

    let progress = std::sync::Arc::new(move |event: ProgressEvent| match event {
        ProgressEvent::FrameProcessed { frame_id, total } => {
            if frame_id % 50 == 0 {
                info!(frame_id, total, "processing");
            }
        }
        ProgressEvent::Finished => info!("processing finished"),
        ProgressEvent::Cancelled => info!("processing cancelled"),
    });

    let options = RunOptions {
        denoise: args.denoise.into(),
        glare: args.glare.into(),
        geometry_override,
        frame_limit: args.limit,
        progress: Some(progress),
        cancellation,
    };

    let created_at = chrono::Utc::now().to_rfc3339();
    run(&args.video, &cache_path, &cfg, options, created_at)?;
    info!(cache = %cache_path.display(), "results cache written");
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<PipelineConfig, PipelineError> {
    match path {
        None => Ok(PipelineConfig::default()),
        Some(path) => {
            let bytes = std::fs::read(path)?;
            Ok(serde_json::from_slice(&bytes)?)
        }
    }
}

fn load_geometry_override(
    geometry_path: Option<&std::path::Path>,
    calibration_path: Option<&std::path::Path>,
) -> Result<GeometryOverride, PipelineError> {
    let mut overrides = GeometryOverride::default();

    if let Some(path) = geometry_path {
        let bytes = std::fs::read(path)?;
        let file: GeometryOverrideFile = serde_json::from_slice(&bytes)?;
        overrides.roi = Some((file.center_x_px, file.center_y_px, file.radius_px));
    }

    if let Some(path) = calibration_path {
        let bytes = std::fs::read(path)?;
        let file: CalibrationOverride = serde_json::from_slice(&bytes)?;
        if file.source == "manual" {
            overrides.px_per_mm = Some(file.px_per_mm);
        }
    }

    Ok(overrides)
}
