//! # HMI Host Binary
//!
//! Runs the register coordination core against a simulated field device.
//!
//! # Usage
//!
//! ```bash
//! # Run with the packaged configuration
//! hmi --config config/hmi.toml
//!
//! # Verbose JSON logs
//! hmi --config config/hmi.toml -v --json
//! ```

#![deny(warnings)]

use std::path::PathBuf;

use clap::Parser;
use hmi::{Runtime, shutdown_signal};
use hmi_common::consts::DEFAULT_CONFIG_PATH;
use hmi_common::prelude::*;
use hmi_modbus::DeviceSimulator;
use tracing::{error, info, warn};

/// HMI host - register coordination and service supervision
#[derive(Parser, Debug)]
#[command(name = "hmi")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Field-device HMI core with supervised services")]
#[command(long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("hmi: {e}");
        error!("HMI failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = HmiConfig::load(&args.config)?;
    config.validate()?;

    let level = if args.verbose {
        LogLevel::Debug
    } else {
        config.shared.log_level
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let (simulator, link) = DeviceSimulator::new(&config.device);
        let mut startup = Startup::new()
            .with(LoggingSubsystem::new(level, args.json))
            .with(simulator);
        startup.init_all()?;

        info!(
            "HMI v{} starting as '{}' with {} register(s)",
            env!("CARGO_PKG_VERSION"),
            config.shared.service_name,
            config.registers.len()
        );

        let mut host = Runtime::new(config, link)?;
        host.start();
        let result = host.run(shutdown_signal()).await;
        host.shutdown();

        for e in startup.shutdown_all() {
            warn!("Teardown error: {}", e);
        }
        result?;

        info!("HMI shutdown complete");
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
