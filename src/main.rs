use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rover_runtime::config::RuntimeConfig;
use rover_runtime::runtime::{self, RunOptions};

/// Remote-controlled / obstacle-avoiding rover
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// JSON config file; missing fields use built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port of the motor shield bridge board
    #[arg(long)]
    bridge_port: Option<String>,

    /// Serial port of the Bluetooth operator link
    #[arg(long)]
    remote_port: Option<String>,

    /// Baud rate of the operator link
    #[arg(long)]
    baud: Option<u32>,

    /// Control loop frequency in Hz
    #[arg(long)]
    loop_hz: Option<u64>,

    /// Drive a simulated vehicle instead of the bridge board
    #[arg(long)]
    simulate: bool,

    /// Take operator keys from this terminal instead of the Bluetooth link
    #[arg(long)]
    keyboard: bool,

    /// Print one JSON tick report per loop iteration on stdout
    #[arg(long)]
    telemetry: bool,
}

impl Cli {
    fn into_options(self) -> Result<RunOptions, Box<dyn std::error::Error + Send + Sync>> {
        let mut config = match &self.config {
            Some(path) => RuntimeConfig::load(path)?,
            None => RuntimeConfig::default(),
        };
        if let Some(port) = self.bridge_port {
            config.bridge_port = port;
        }
        if let Some(port) = self.remote_port {
            config.remote_port = port;
        }
        if let Some(baud) = self.baud {
            config.remote_baudrate = baud;
        }
        if let Some(hz) = self.loop_hz {
            config.loop_hz = hz;
        }
        config.validate()?;

        Ok(RunOptions {
            config,
            simulate: self.simulate,
            keyboard: self.keyboard,
            telemetry: self.telemetry,
        })
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let options = match Cli::parse().into_options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
