//! PlateReader - Real-time license plate reading from a camera stream
//!
//! Replays recorded camera frames and device motion through the reader
//! pipeline and reports the stabilized plate reading.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use plate_reader::config::{self, AppConfig};
use plate_reader::vision::RecognizerBackend;
use plate_reader::{Capabilities, PlateReaderApp, RunSummary};

/// PlateReader - Real-time license plate reading
#[derive(Parser, Debug)]
#[command(name = "plate-reader")]
#[command(about = "Reads license plates from camera frames with tilt correction and temporal smoothing")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the reader pipeline
    Run(RunArgs),
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    ShowConfig,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory of recorded camera frames
    #[arg(short, long)]
    frames: Option<PathBuf>,

    /// Replay the frames until the frame limit is reached
    #[arg(long = "loop")]
    loop_frames: bool,

    /// Recorded gravity samples (`x,y,z` per line)
    #[arg(short, long, conflicts_with = "tilt")]
    gravity: Option<PathBuf>,

    /// Fixed clockwise device tilt in degrees
    #[arg(long, allow_hyphen_values = true)]
    tilt: Option<f64>,

    /// Recognizer backend
    #[arg(short, long, value_enum)]
    recognizer: Option<BackendArg>,

    /// Transcript of readings for the replay recognizer
    #[arg(short, long)]
    transcript: Option<PathBuf>,

    /// Directory for screen snapshots
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Write a JSON run report here
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Disabled,
    Replay,
    Tesseract,
}

impl From<BackendArg> for RecognizerBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Disabled => RecognizerBackend::Disabled,
            BackendArg::Replay => RecognizerBackend::Replay,
            BackendArg::Tesseract => RecognizerBackend::Tesseract,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };

    match cli.command {
        Command::Run(args) => {
            let mut config = load_or_create_config(&config_path);
            apply_overrides(&mut config, args);
            run(config)
        }
        Command::InitConfig { force } => {
            if config_path.exists() && !force {
                anyhow::bail!("{} already exists, pass --force to overwrite", config_path.display());
            }
            config::save_config(&AppConfig::default(), &config_path)?;
            println!("Wrote default configuration to {}", config_path.display());
            Ok(())
        }
        Command::ShowConfig => {
            let config = load_or_create_config(&config_path);
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Load configuration from file or fall back to defaults
fn load_or_create_config(path: &Path) -> AppConfig {
    if path.exists() {
        match config::load_config(path) {
            Ok(config) => {
                info!("Loaded configuration from {:?}", path);
                return config;
            }
            Err(e) => warn!("Ignoring configuration: {:#}", e),
        }
    }
    info!("Using default configuration");
    AppConfig::default()
}

/// Command line flags take precedence over the config file
fn apply_overrides(config: &mut AppConfig, args: RunArgs) {
    if let Some(frames) = args.frames {
        config.capture.frames_dir = Some(frames);
    }
    if args.loop_frames {
        config.capture.loop_frames = true;
    }
    if let Some(max_frames) = args.max_frames {
        config.capture.max_frames = Some(max_frames);
    }
    if let Some(gravity) = args.gravity {
        config.motion.gravity_file = Some(gravity);
        config.motion.fixed_tilt_degrees = None;
    }
    if let Some(tilt) = args.tilt {
        config.motion.gravity_file = None;
        config.motion.fixed_tilt_degrees = Some(tilt);
    }
    if let Some(transcript) = args.transcript {
        config.recognition.transcript = Some(transcript);
        if args.recognizer.is_none() {
            config.recognition.backend = RecognizerBackend::Replay;
        }
    }
    if let Some(backend) = args.recognizer {
        config.recognition.backend = backend.into();
    }
    if let Some(output) = args.output {
        config.output.snapshot_dir = Some(output);
    }
    if let Some(report) = args.report {
        config.output.report = Some(report);
    }
}

fn run(config: AppConfig) -> Result<()> {
    info!("PlateReader starting...");

    let capabilities = Capabilities::from_config(&config)?;
    let report_path = config.output.report.clone();

    let mut app = PlateReaderApp::new(config, capabilities);
    app.run()?;
    let summary = app.wait()?;

    print_summary(&summary);

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Report written to {:?}", path);
    }

    info!("PlateReader shutdown complete");
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let stats = &summary.stats;
    let plate = if summary.display.label.is_empty() {
        "-"
    } else {
        summary.display.label.as_str()
    };

    println!("Plate:        {} ({:.0}% confidence)", plate, summary.display.progress * 100.0);
    println!(
        "Frames:       {} captured, {} dropped, {} processed",
        stats.frames_captured, stats.frames_dropped, stats.frames_processed
    );
    println!(
        "Candidates:   {} ({:.0}% of frames)",
        stats.patches_found,
        stats.detection_rate() * 100.0
    );
    println!(
        "Recognition:  {} submitted, {} skipped busy, {} completed, {} failed",
        stats.recognitions_submitted,
        stats.recognitions_skipped_busy,
        stats.recognitions_completed,
        stats.recognitions_failed
    );
    if let Some(mean) = stats.mean_recognition_time() {
        println!("Recognizer:   {:?} per patch", mean);
    }
    println!("Elapsed:      {} ms", summary.elapsed_ms);
}
