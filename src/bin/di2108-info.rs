use anyhow::{Context, Result, bail};
use clap::Parser;
use di2108_lib::constants::SRATE_MIN;
use di2108_lib::{Di2108, LedColor, SessionConfig, sample_rate_hz};
use di2108_rs::logging::LogOptions;
use std::process;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

const INFO_FIELDS: [(u8, &str); 10] = [
    (0, "Manufacturer"),
    (1, "Device name"),
    (2, "Firmware revision"),
    (3, "Reserved (3)"),
    (4, "Reserved (4)"),
    (5, "Reserved (5)"),
    (6, "Serial number"),
    (7, "Reserved (7)"),
    (8, "Reserved (8)"),
    (9, "Sample rate divisor"),
];

/// Identify a DATAQ DI-2108 and dump its `info` fields.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Serial number of the instrument to open.
    #[arg(short, long)]
    serial: Option<String>,
    /// Don't reset the device before claiming it.
    #[arg(long)]
    no_reset: bool,
    /// Cycle the status LED through every color.
    #[arg(long)]
    leds: bool,
    /// How long each LED color is shown, in milliseconds.
    #[arg(long, default_value_t = 300)]
    led_ms: u64,
    #[command(flatten)]
    log: LogOptions,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = cli.log.init()?;

    if let Err(e) = run(cli).await {
        error!("Info dump failed: {:?}", e);
        process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = SessionConfig::default();
    if let Some(serial) = cli.serial {
        config = config.with_serial_number(serial);
    }
    if cli.no_reset {
        config = config.skip_reset();
    }

    let mut device = Di2108::open(config).await.context("Failed to open DI-2108")?;
    println!("Connected to {}", device.device());

    if !device.check_connection().await? {
        bail!("Device did not identify as DATAQ");
    }

    for (selector, label) in INFO_FIELDS {
        match device.info(selector).await {
            Ok(value) => println!("  {label:<20} {value}"),
            Err(e) if e.is_timeout() => warn!(selector, "No answer to info query"),
            Err(e) => return Err(e.into()),
        }
    }

    let divisor = device.sample_rate_divisor().await?;
    info!(divisor, "Sample rate divisor");
    println!("  Fastest scan rate    {:.0} Hz", sample_rate_hz(SRATE_MIN, 1));

    let inputs = device.digital_inputs().await?;
    println!("  Digital inputs       {inputs:#09b}");

    if cli.leds {
        info!("Cycling status LED");
        for color in LedColor::ALL {
            device.led(color).await?;
            println!("  LED {color}");
            sleep(Duration::from_millis(cli.led_ms)).await;
        }
        device.led(LedColor::Green).await?;
    }

    device.close().await?;
    Ok(())
}
