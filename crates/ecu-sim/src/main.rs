//! OBD-II ECU Simulator
//!
//! Answers OBD-II requests on a SocketCAN interface, for testing clients
//! without a vehicle.
//!
//! # Usage
//!
//! ```bash
//! sudo ip link add dev vcan0 type vcan && sudo ip link set up vcan0
//! ./ecu-sim --interface vcan0
//! ```
//!
//! With config file:
//! ```bash
//! ./ecu-sim --config config/ecu-sim.toml
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ecu_sim::{EcuConfig, EcuSimulator};
use obd_can::config::SocketCanConfig;
use obd_can::{create_driver, AddressingMode, DriverConfig, VirtualBus};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ecu-sim")]
#[command(about = "Simulated OBD-II ECU on SocketCAN")]
struct Args {
    /// Configuration file path (TOML format)
    /// If provided, overrides command-line options
    #[arg(short, long)]
    config: Option<String>,

    /// CAN interface name
    #[arg(short, long, default_value = "vcan0")]
    interface: String,

    /// Use 29-bit identifiers
    #[arg(long)]
    extended: bool,

    /// Seed for reproducible values
    #[arg(long)]
    seed: Option<u64>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose {
        "ecu_sim=debug,obd_can=debug"
    } else {
        "ecu_sim=info,obd_can=info"
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        info!("Loading config from: {}", config_path);
        EcuConfig::load(config_path).context("Failed to load config")?
    } else {
        EcuConfig {
            addressing: if args.extended {
                AddressingMode::Extended
            } else {
                AddressingMode::Standard
            },
            interface: args.interface.clone(),
            seed: args.seed,
            ..Default::default()
        }
    };

    info!("Starting OBD-II ECU Simulator");
    info!(
        interface = %config.interface,
        addressing = ?config.addressing,
        supported_pids = config.supported_pids.len(),
        vin = config.vin.is_some(),
        dtcs = config.dtcs.as_ref().map_or(0, |d| d.len())
    );

    let driver = create_driver(
        &DriverConfig::SocketCan(SocketCanConfig {
            interface: config.interface.clone(),
        }),
        &VirtualBus::new(),
    )
    .context("Failed to open CAN interface")?;

    let mut simulator = EcuSimulator::new(driver, &config);
    let [primary, secondary] = simulator.response_ids();
    info!(
        primary = format!("0x{:X}", primary),
        secondary = format!("0x{:X}", secondary),
        "ECU Simulator ready - waiting for requests"
    );
    info!("Press Ctrl+C to stop");

    let running = Arc::new(AtomicBool::new(true));
    let running_for_signal = running.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
        }
        running_for_signal.store(false, Ordering::SeqCst);
    });

    // Run until interrupted
    simulator.run(running).await;

    info!("ECU Simulator stopped");
    Ok(())
}
