//! CLI entry point for linescan
//!
//! Runs a scan against simulated hardware:
//! - picks a motion profile from the configuration or from the stages given
//!   on the command line
//! - optionally runs a live frame reader next to the recording
//! - stops cleanly on Ctrl+C
//!
//! # Usage
//!
//! ```bash
//! linescan run --stage rotation --stage y-rotation --scan-lines 3
//! linescan run --profile stationary --frames 500 --reader
//! linescan show-config --config config/default.toml
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use linescan_daq::config::{ProfileKind, ScanConfig, DEFAULT_CONFIG_PATH};
use linescan_daq::hardware::mock::{MockCamera, MockRecorder, MockStage};
use linescan_daq::hardware::{LineScanCamera, Stage, StageKind};
use linescan_daq::profiles::{MotionProfile, ScanJob, ScanProfile, ScanWorker};
use linescan_daq::reader::FrameReader;
use linescan_daq::recording::RecordingOrchestrator;
use linescan_daq::tracing_setup::{self, OutputFormat, TracingConfig};
use linescan_daq::worker::Worker;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "linescan")]
#[command(about = "Synchronized line-scan recording with simulated hardware", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scan until it completes or Ctrl+C is pressed
    Run(RunArgs),

    /// Print the effective configuration
    ShowConfig {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the configured motion profile
    #[arg(long, value_parser = parse_profile)]
    profile: Option<ProfileKind>,

    /// Simulated stage to connect, by type (translation, rotation, y-rotation)
    #[arg(long = "stage")]
    stages: Vec<String>,

    /// Override the scan length (cm or degrees)
    #[arg(long)]
    length: Option<f64>,

    /// Override the raster line count
    #[arg(long)]
    scan_lines: Option<u32>,

    /// Override the stationary frame count (0 = until stopped)
    #[arg(long)]
    frames: Option<u32>,

    /// Run a live frame reader alongside the recording
    #[arg(long)]
    reader: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "compact")]
    log_format: OutputFormat,
}

fn parse_profile(value: &str) -> Result<ProfileKind, String> {
    match value {
        "auto" => Ok(ProfileKind::Auto),
        "stationary" => Ok(ProfileKind::Stationary),
        "translation" => Ok(ProfileKind::Translation),
        "rotation" => Ok(ProfileKind::Rotation),
        "raster" => Ok(ProfileKind::Raster),
        other => Err(format!(
            "unknown profile '{other}' (auto, stationary, translation, rotation, raster)"
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_scan(args).await,
        Commands::ShowConfig { config } => show_config(config),
    }
}

fn show_config(path: PathBuf) -> Result<()> {
    let config = ScanConfig::load_from(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    config.validate()?;
    print!("{}", config.to_toml()?);
    Ok(())
}

async fn run_scan(args: RunArgs) -> Result<()> {
    let mut config = ScanConfig::load_from(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(profile) = args.profile {
        config.scan.profile = profile;
    }
    if let Some(length) = args.length {
        config.scan.length = length;
    }
    if let Some(scan_lines) = args.scan_lines {
        config.scan.scan_lines = scan_lines;
    }
    if let Some(frames) = args.frames {
        config.scan.frames = frames;
    }
    config.validate()?;

    let tracing_config = TracingConfig::from_scan_config(&config)
        .map_err(anyhow::Error::msg)?
        .with_format(args.log_format);
    tracing_setup::init(tracing_config).map_err(anyhow::Error::msg)?;

    let (primary, cross_axis) = connect_stages(&args.stages);
    let camera = Arc::new(MockCamera::new());
    let line_rate =
        1e6 / (f64::from(camera.frame_period_us()) * f64::from(camera.averaged_frames().max(1)));

    let profile = ScanProfile::from_settings(
        &config.scan,
        primary.as_ref().map(|stage| stage.kind()),
        cross_axis,
    )?;
    let stage = if profile.requires_stage() {
        primary
    } else {
        None
    };

    let orchestrator = RecordingOrchestrator::builder(
        camera.clone(),
        MockRecorder::new().with_line_rate(line_rate),
    )
    .maybe_stage(stage)
    .config(&config)
    .build()?;

    info!(
        profile = profile.name(),
        camera = %camera.id(),
        "Scan configured"
    );
    let scan: Arc<ScanWorker> = Arc::new(Worker::new(ScanJob::new(orchestrator, profile)?));

    let reader = if args.reader {
        let reader = Worker::new(
            FrameReader::new(camera.clone()).with_timeout(config.timing.frame_timeout()),
        );
        reader.start()?;
        Some(reader)
    } else {
        None
    };

    scan.start()?;
    info!("Scan running, press Ctrl+C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Stop requested");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if !scan.is_running() {
                    break;
                }
            }
        }
    }

    let worker = Arc::clone(&scan);
    tokio::task::spawn_blocking(move || {
        worker.stop();
        worker.join();
        if let Some(reader) = reader {
            reader.stop();
            reader.join();
            let stats = reader.body().stats();
            info!(
                frames = stats.frames_read(),
                saturated = stats.saturated_frames(),
                "Frame reader stopped"
            );
        }
    })
    .await?;

    camera.stop_acquisition()?;

    let job = scan.body();
    for outcome in job.outcomes() {
        info!(
            file = %outcome.file_name,
            frames = outcome.frames_written,
            target = outcome.target_frames,
            status = %outcome.final_status,
            success = outcome.success(),
            "Recording finished"
        );
    }

    if !job.succeeded() {
        bail!("scan did not complete successfully");
    }
    Ok(())
}

/// Build simulated stages for the requested type names.
///
/// Returns the primary axis and, if requested, the cross rotation axis.
fn connect_stages(names: &[String]) -> (Option<Arc<dyn Stage>>, Option<Arc<dyn Stage>>) {
    let mut primary: Option<Arc<dyn Stage>> = None;
    let mut cross_axis: Option<Arc<dyn Stage>> = None;

    for name in names {
        let Some(kind) = StageKind::from_type_name(name) else {
            warn!(stage = %name, "Unknown stage type, ignored");
            continue;
        };
        let stage: Arc<dyn Stage> = Arc::new(
            MockStage::new(format!("mock-{name}"), kind)
                .with_travel_time()
                .with_recommended_speed(10.0),
        );
        match kind {
            StageKind::CrossRotation => cross_axis = Some(stage),
            StageKind::Translation | StageKind::Rotation => {
                if primary.is_some() {
                    warn!(stage = %name, "Primary stage already connected, ignored");
                } else {
                    primary = Some(stage);
                }
            }
        }
    }

    (primary, cross_axis)
}
