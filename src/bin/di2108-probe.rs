use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use di2108_lib::{CalibrationModel, CalibrationRecorder, Channel, DistanceProbe, SessionConfig};
use di2108_rs::logging::LogOptions;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Read a displacement sensor wired to one analog input of a DATAQ DI-2108.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Analog input the sensor is wired to (0-7).
    #[arg(short, long, default_value_t = 0)]
    channel: u8,
    /// Serial number of the instrument to open.
    #[arg(short, long)]
    serial: Option<String>,
    /// Don't reset the device before claiming it.
    #[arg(long)]
    no_reset: bool,
    #[command(flatten)]
    log: LogOptions,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Take calibrated readings.
    Measure {
        /// Calibration file (distance,volts rows); raw volts without one.
        #[arg(long)]
        calibration: Option<PathBuf>,
        /// Number of readings; 0 runs until Ctrl+C.
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
        /// Pause between readings, in milliseconds.
        #[arg(short, long, default_value_t = 500)]
        interval_ms: u64,
    },
    /// Record calibration points interactively: type a known distance,
    /// press Enter to measure it, and an empty line to finish.
    Calibrate {
        /// File the points are written to (truncated).
        output: PathBuf,
    },
    /// Fit a calibration file without touching the instrument.
    Fit { input: PathBuf },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = cli.log.init()?;

    let result = tokio::select! {
        res = run(cli) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down.");
            Ok(())
        }
    };
    if let Err(e) = result {
        error!("Probe failed: {:?}", e);
        process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    if let Command::Fit { input } = &cli.command {
        let model = CalibrationModel::load_csv(input)
            .with_context(|| format!("Failed to fit {:?}", input))?;
        println!("distance = {:.6} * volts + {:.6}", model.slope, model.intercept);
        return Ok(());
    }

    let channel = Channel::analog(cli.channel)?;
    let mut config = SessionConfig::default();
    if let Some(serial) = cli.serial {
        config = config.with_serial_number(serial);
    }
    if cli.no_reset {
        config = config.skip_reset();
    }
    let mut probe = DistanceProbe::open(channel, config)
        .await
        .context("Failed to open DI-2108 probe")?;

    let result = match cli.command {
        Command::Measure {
            calibration,
            count,
            interval_ms,
        } => measure(&mut probe, calibration, count, interval_ms).await,
        Command::Calibrate { output } => calibrate(&mut probe, output).await,
        Command::Fit { .. } => Ok(()),
    };

    if let Err(e) = probe.close().await {
        warn!("Failed to close device cleanly: {}", e);
    }
    result
}

async fn measure(
    probe: &mut DistanceProbe,
    calibration: Option<PathBuf>,
    count: u32,
    interval_ms: u64,
) -> Result<()> {
    if let Some(path) = calibration {
        probe
            .load_calibration(&path)
            .with_context(|| format!("Failed to load calibration {:?}", path))?;
    }

    let mut taken = 0;
    while count == 0 || taken < count {
        let distance = probe.reading().await?;
        taken += 1;
        println!("[{taken}] {distance:.4}");
        sleep(Duration::from_millis(interval_ms)).await;
    }
    Ok(())
}

async fn calibrate(probe: &mut DistanceProbe, output: PathBuf) -> Result<()> {
    let mut recorder = CalibrationRecorder::create(&output)
        .with_context(|| format!("Failed to create {:?}", output))?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Enter a known distance and press Enter; empty line to finish.");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let Ok(distance) = line.parse::<f64>() else {
            warn!("Not a number: {line:?}");
            continue;
        };
        let point = probe.record_point(distance, &mut recorder).await?;
        println!("  {:.4} -> {:.5} V", point.distance, point.volts);
    }

    info!(rows = recorder.rows(), path = ?output, "Calibration points saved");
    if recorder.rows() >= 2 {
        drop(recorder);
        let model = CalibrationModel::load_csv(&output)?;
        println!("distance = {:.6} * volts + {:.6}", model.slope, model.intercept);
    }
    Ok(())
}
