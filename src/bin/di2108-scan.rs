use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use di2108_lib::{
    Channel, Di2108, FilterMode, FilterTarget, LedColor, PacketSize, SampleBlock, ScanMode,
    ScanState, SessionConfig, sample_rate_hz,
};
use di2108_rs::logging::LogOptions;
use serde_json::json;
use std::process;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Normal,
    /// Paced by edges on the external trigger input
    External,
    Immediate,
}

impl From<Mode> for ScanMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Normal => ScanMode::Normal,
            Mode::External => ScanMode::External,
            Mode::Immediate => ScanMode::Immediate,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Filter {
    LastPoint,
    Cic,
    Maximum,
    Minimum,
}

impl From<Filter> for FilterMode {
    fn from(filter: Filter) -> Self {
        match filter {
            Filter::LastPoint => FilterMode::LastPoint,
            Filter::Cic => FilterMode::Cic,
            Filter::Maximum => FilterMode::Maximum,
            Filter::Minimum => FilterMode::Minimum,
        }
    }
}

/// Stream scan data from a DATAQ DI-2108.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Analog inputs to scan, in slot order (repeatable).
    #[arg(short, long = "channel", default_values_t = [0u8])]
    channels: Vec<u8>,
    /// Append the digital input port to the scan list.
    #[arg(long)]
    digital: bool,
    /// Sample rate divisor (375-65535).
    #[arg(long, default_value_t = 6000)]
    srate: u16,
    /// Decimation factor (1-512).
    #[arg(long, default_value_t = 1)]
    dec: u16,
    /// Filter applied to every analog channel.
    #[arg(long, value_enum, default_value_t = Filter::LastPoint)]
    filter: Filter,
    /// Packet size in bytes (16-2048).
    #[arg(long, default_value_t = 64)]
    packet_size: usize,
    #[arg(long, value_enum, default_value_t = Mode::Normal)]
    mode: Mode,
    /// Number of blocks to read; 0 runs until Ctrl+C.
    #[arg(short, long, default_value_t = 10)]
    blocks: u32,
    /// Print each block as a JSON line.
    #[arg(long)]
    json: bool,
    /// Serial number of the instrument to open.
    #[arg(short, long)]
    serial: Option<String>,
    /// Don't reset the device before claiming it.
    #[arg(long)]
    no_reset: bool,
    #[command(flatten)]
    log: LogOptions,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = cli.log.init()?;

    let packet_size = PacketSize::from_bytes(cli.packet_size)?;
    let mut config = SessionConfig::default().with_packet_size(packet_size);
    if let Some(serial) = cli.serial.clone() {
        config = config.with_serial_number(serial);
    }
    if cli.no_reset {
        config = config.skip_reset();
    }

    let mut device = Di2108::open(config).await.context("Failed to open DI-2108")?;

    let result = tokio::select! {
        res = run(&mut device, &cli) => res,
        _ = signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down gracefully.");
            Ok(())
        }
    };

    if let Err(e) = device.close().await {
        warn!("Failed to close device cleanly: {}", e);
    }
    if let Err(e) = result {
        error!("Scan failed: {:?}", e);
        process::exit(1);
    }
    Ok(())
}

async fn run(device: &mut Di2108, cli: &Cli) -> Result<()> {
    let mut position = 0;
    for &index in &cli.channels {
        device.add_channel(position, Channel::analog(index)?).await?;
        position += 1;
    }
    if cli.digital {
        device.add_channel(position, Channel::DigitalIn).await?;
    }

    device.srate(cli.srate).await?;
    device.dec(cli.dec).await?;
    device.filter(FilterTarget::All, cli.filter.into()).await?;
    device.led(LedColor::Cyan).await?;
    info!(
        rate_hz = sample_rate_hz(cli.srate, cli.dec),
        slots = device.scan_list().slot_count(),
        "Configured scan"
    );

    device.start(cli.mode.into()).await?;
    let mut received = 0;
    while cli.blocks == 0 || received < cli.blocks {
        if device.scan_state() == ScanState::Idle {
            break;
        }
        let Some(block) = device.read_block().await? else {
            warn!("No scan data within the poll timeout");
            continue;
        };
        received += 1;
        print_block(&block, cli.json);
    }

    device.stop().await?;
    device.led(LedColor::Green).await?;
    info!(received, "Finished scanning");
    Ok(())
}

fn print_block(block: &SampleBlock, as_json: bool) {
    if as_json {
        let line = json!({
            "scan_id": block.scan_id(),
            "bytes": block.len(),
            "analog": block.analog_readings(),
        });
        println!("{line}");
    } else {
        println!("{block}");
    }
}
