//! hvacmon: watch a zone controller's LEDs through a fixed camera and log
//! every state transition to SQLite.
//!
//! # Usage
//!
//! ```text
//! hvacmon decode frame.png                      # inspect one frame
//! hvacmon replay frames/ --db hvac.db           # process captured frames
//! hvacmon temperature 27.4 --db hvac.db         # log an outdoor reading
//! hvacmon history --db hvac.db --json           # dump stored readings
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod monitor;
mod sampler;
mod snapshot;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use hvacmon_pipeline::{
    DecodeOutcome, DecoderKind, Frame, LedMeasurements, PanelConfig, PanelDecoder, PanelError,
    ReadingSink, TemperatureReading, ZoneReading,
};
use hvacmon_store::SqliteStore;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::monitor::{Monitor, MonitorError};
use crate::sampler::{DirectorySampler, OffsetPolicy};
use crate::snapshot::SnapshotArchive;

/// Database used when `--db` is not given.
const DEFAULT_DB: &str = "/var/lib/hvacmon/hvacmon.db";

/// HVAC zone controller LED monitor.
#[derive(Parser)]
#[command(name = "hvacmon", version)]
struct Cli {
    #[command(flatten)]
    panel: PanelArgs,

    #[command(subcommand)]
    command: Command,
}

/// Panel settings shared by every subcommand.
#[derive(Args)]
struct PanelArgs {
    /// Panel configuration as a JSON file. Flags below override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// LED reading strategy.
    #[arg(long, global = true, value_enum)]
    strategy: Option<Strategy>,

    /// Minimum mean luminance (0-255) for an LED to count as lit.
    #[arg(long, global = true)]
    threshold: Option<f32>,

    /// Sampling window half-width in pixels.
    #[arg(long, global = true)]
    window: Option<u32>,

    /// Seconds a constant status may go unrecorded.
    #[arg(long, global = true)]
    quiescence_timeout: Option<f64>,

    /// Stamp readings in UTC instead of the local offset.
    #[arg(long, global = true)]
    utc: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Decode one image and print the outcome and LED measurements.
    Decode {
        /// Image file (PNG, JPEG, BMP, WebP).
        image: PathBuf,

        /// Print JSON instead of a report.
        #[arg(long)]
        json: bool,
    },

    /// Process a directory of frames named by capture time, oldest first.
    Replay {
        /// Directory of `%Y-%m-%d_%H-%M-%S[.ffffff].<ext>` frames.
        dir: PathBuf,

        /// SQLite database to append readings to.
        #[arg(long, default_value = DEFAULT_DB)]
        db: PathBuf,

        /// Archive each reading's trigger frame under this directory.
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,
    },

    /// Record an outdoor temperature reading stamped now.
    Temperature {
        /// Degrees Fahrenheit.
        #[arg(allow_negative_numbers = true)]
        fahrenheit: f64,

        /// SQLite database to append the reading to.
        #[arg(long, default_value = DEFAULT_DB)]
        db: PathBuf,
    },

    /// Print stored readings.
    History {
        /// SQLite database to read.
        #[arg(long, default_value = DEFAULT_DB)]
        db: PathBuf,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

/// LED reading strategy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    /// Threshold luminance at calibrated LED centres.
    FixedCentroids,
    /// Detect LEDs by color relative to the power LED.
    ColorBlob,
}

impl From<Strategy> for DecoderKind {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::FixedCentroids => Self::FixedCentroids,
            Strategy::ColorBlob => Self::ColorBlob,
        }
    }
}

impl PanelArgs {
    const fn offset_policy(&self) -> OffsetPolicy {
        if self.utc {
            OffsetPolicy::Utc
        } else {
            OffsetPolicy::Local
        }
    }
}

/// Build a [`PanelConfig`] from the configuration file (or defaults) and
/// the individual override flags.
fn config_from_args(args: &PanelArgs) -> Result<PanelConfig, MonitorError> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|source| MonitorError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&text).map_err(|source| MonitorError::Config {
                path: path.clone(),
                source,
            })?
        }
        None => PanelConfig::default(),
    };

    if let Some(strategy) = args.strategy {
        config.strategy = strategy.into();
    }
    if let Some(threshold) = args.threshold {
        config.centroids.threshold = threshold;
    }
    if let Some(window) = args.window {
        config.centroids.window = window;
    }
    if let Some(seconds) = args.quiescence_timeout {
        config.quiescence_timeout = Duration::try_from_secs_f64(seconds).map_err(|_| {
            PanelError::InvalidConfig(format!(
                "quiescence timeout must be a non-negative number of seconds, got {seconds}"
            ))
        })?;
    }
    Ok(config)
}

#[derive(Serialize)]
struct DecodeReport {
    outcome: DecodeOutcome,
    measurements: Option<LedMeasurements>,
}

fn decode(decoder: &PanelDecoder, image: &Path, json: bool) -> Result<(), MonitorError> {
    let bytes = std::fs::read(image).map_err(|source| MonitorError::Io {
        path: image.to_path_buf(),
        source,
    })?;
    let frame = Frame::load(&bytes).map_err(|source| MonitorError::Frame {
        path: image.to_path_buf(),
        source,
    })?;

    let report = DecodeReport {
        outcome: decoder.decode(&frame),
        measurements: decoder.measure(&frame),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("frame:    {}", frame.dimensions());
    println!(
        "strategy: {}",
        match decoder.config().strategy {
            DecoderKind::FixedCentroids => "fixed-centroids",
            DecoderKind::ColorBlob => "color-blob",
        }
    );
    match report.outcome {
        DecodeOutcome::Decoded(status) => println!("status:   {status}"),
        DecodeOutcome::Failed(reason) => println!("failed:   {reason}"),
    }
    if let Some(measurements) = report.measurements {
        println!();
        println!(
            "{:<10} {:>8}  (threshold {:.1})",
            "led",
            "mean",
            decoder.config().centroids.threshold
        );
        for (name, mean) in measurements.iter() {
            println!("{name:<10} {mean:>8.2}");
        }
    }
    Ok(())
}

fn replay(
    decoder: PanelDecoder,
    policy: OffsetPolicy,
    dir: &Path,
    db: &Path,
    snapshot_dir: Option<PathBuf>,
) -> Result<(), MonitorError> {
    let sampler = DirectorySampler::open(dir, policy)?;
    let mut monitor = Monitor::new(decoder, SqliteStore::open(db)?);
    if let Some(root) = snapshot_dir {
        monitor = monitor.with_snapshots(SnapshotArchive::new(root));
    }

    let mut frames = 0_usize;
    let mut readings = 0_usize;
    let mut skipped = 0_usize;
    for sample in sampler {
        let sample = match sample {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable frame");
                skipped += 1;
                continue;
            }
        };
        match monitor.sample(sample.timestamp, &sample.frame) {
            Ok(transition) => {
                frames += 1;
                if transition.reading().is_some() {
                    readings += 1;
                }
            }
            Err(MonitorError::Panel(e @ PanelError::NonMonotonicTimestamp { .. })) => {
                tracing::warn!(
                    path = %sample.source.display(),
                    error = %e,
                    "skipping duplicate frame"
                );
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    if let Some(tracker) = monitor.tracker() {
        tracing::info!(
            status = %tracker.last_status(),
            since = %tracker.last_timestamp(),
            "open interval left unrecorded"
        );
    }
    tracing::info!(frames, readings, skipped, "replay finished");
    println!("{frames} frames processed, {readings} readings recorded, {skipped} skipped");
    println!(
        "{} zone readings in {}",
        monitor.sink().zone_readings()?.len(),
        db.display()
    );
    Ok(())
}

fn temperature(policy: OffsetPolicy, fahrenheit: f64, db: &Path) -> Result<(), MonitorError> {
    if !fahrenheit.is_finite() {
        let message = format!("temperature must be finite, got {fahrenheit}");
        return Err(PanelError::InvalidConfig(message).into());
    }
    let reading = TemperatureReading {
        timestamp: policy.now(),
        fahrenheit,
    };
    SqliteStore::open(db)?.append_temperature_reading(&reading)?;
    tracing::info!(timestamp = %reading.timestamp, fahrenheit, "temperature recorded");
    Ok(())
}

#[derive(Serialize)]
struct History {
    zone_readings: Vec<ZoneReading>,
    temperature_readings: Vec<TemperatureReading>,
}

fn history(db: &Path, json: bool) -> Result<(), MonitorError> {
    let store = SqliteStore::open(db)?;
    let history = History {
        zone_readings: store.zone_readings()?,
        temperature_readings: store.temperature_readings()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    println!("zone readings ({}):", history.zone_readings.len());
    for r in &history.zone_readings {
        println!("  {}  {}  {}", r.start, r.end, r.status);
    }
    println!("temperature readings ({}):", history.temperature_readings.len());
    for r in &history.temperature_readings {
        println!("  {}  {:.1} F", r.timestamp, r.fahrenheit);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), MonitorError> {
    let policy = cli.panel.offset_policy();
    match cli.command {
        Command::Decode { image, json } => {
            decode(&PanelDecoder::new(config_from_args(&cli.panel)?)?, &image, json)
        }
        Command::Replay {
            dir,
            db,
            snapshot_dir,
        } => {
            let decoder = PanelDecoder::new(config_from_args(&cli.panel)?)?;
            replay(decoder, policy, &dir, &db, snapshot_dir)
        }
        Command::Temperature { fahrenheit, db } => temperature(policy, fahrenheit, &db),
        Command::History { db, json } => history(&db, json),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
