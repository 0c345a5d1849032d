use anyhow::{Context, Result};
use clap::Parser;
use di2108_rs::logging::LogOptions;
use tracing::info;

/// List every attached DATAQ DI-2108.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Print the list as JSON instead of text.
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    log: LogOptions,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = cli.log.init()?;

    info!("Listing connected DI-2108 instruments...");
    let devices = di2108_lib::list_devices().context("Failed to list USB devices")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        info!("No DI-2108 found. Is it connected?");
    }
    for (i, device) in devices.iter().enumerate() {
        println!("Device #{}: {}", i + 1, device);
    }
    Ok(())
}
