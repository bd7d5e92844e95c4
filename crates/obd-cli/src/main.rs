//! OBD CLI - Command-line tool for OBD-II diagnostics over CAN
//!
//! # Usage
//!
//! ```bash
//! obd-cli --interface can0 vin
//! obd-cli --extended read rpm speed coolant_temp
//! obd-cli --simulate pids
//! ```

mod commands;
mod output;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ecu_sim::{EcuConfig, EcuSimulator};
use obd_can::config::SocketCanConfig;
use obd_can::{
    create_driver, AddressingMode, DriverConfig, DtcCode, ObdClient, ObdConfig, VirtualBus, Vin,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::Client;
use crate::output::{OutputContext, OutputFormat};

/// VIN and trouble codes the in-process simulator reports with `--simulate`
const SIMULATED_VIN: &str = "1HGCM82633A123456";
const SIMULATED_DTCS: [&str; 2] = ["P0143", "U0100"];

#[derive(Parser)]
#[command(name = "obd-cli")]
#[command(author, version, about = "OBD-II diagnostics over CAN")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, env = "OBD_CONFIG")]
    config: Option<PathBuf>,

    /// CAN interface (overrides the configured SocketCAN interface)
    #[arg(short, long, env = "OBD_INTERFACE")]
    interface: Option<String>,

    /// Use 29-bit identifiers
    #[arg(long)]
    extended: bool,

    /// Talk to an in-process simulated ECU on a virtual bus
    #[arg(long)]
    simulate: bool,

    /// Response timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging (frame dumps)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the vehicle identification number
    Vin,

    /// List stored diagnostic trouble codes
    Dtcs,

    /// List PIDs the ECU reports as supported
    Pids,

    /// Read PIDs by name
    Read {
        /// PID name(s), see `list`
        #[arg(required = true)]
        names: Vec<String>,

        /// Read freeze-frame data instead of live data
        #[arg(long)]
        freeze_frame: bool,
    },

    /// List known PID names
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = load_config(&cli)?;
    let ctx = OutputContext::new(cli.output, cli.no_color, cli.quiet);

    if let Commands::List = cli.command {
        commands::list(&obd_can::PidRegistry::with_defs(&config.pids), &ctx);
        return Ok(());
    }

    let bus = VirtualBus::new();
    let running = Arc::new(AtomicBool::new(true));
    let simulator = if cli.simulate {
        Some(spawn_simulator(&bus, config.addressing, running.clone())?)
    } else {
        None
    };

    let driver = create_driver(&config.driver, &bus).context("Failed to open CAN driver")?;
    let mut client: Client = ObdClient::from_config(driver, &config);

    let result = match &cli.command {
        Commands::Vin => commands::vin(&mut client, &ctx).await,
        Commands::Dtcs => commands::dtcs(&mut client, &ctx).await,
        Commands::Pids => commands::pids(&mut client, &ctx).await,
        Commands::Read {
            names,
            freeze_frame,
        } => commands::read(&mut client, names, *freeze_frame, &ctx).await,
        Commands::List => Ok(()),
    };

    running.store(false, Ordering::SeqCst);
    if let Some(handle) = simulator {
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }

    result
}

/// Configuration file (or defaults) with command-line overrides applied
fn load_config(cli: &Cli) -> Result<ObdConfig> {
    let mut config = match &cli.config {
        Some(path) => ObdConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ObdConfig::default(),
    };

    if cli.extended {
        config.addressing = AddressingMode::Extended;
    }
    if let Some(interface) = &cli.interface {
        config.driver = DriverConfig::SocketCan(SocketCanConfig {
            interface: interface.clone(),
        });
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.transport.timeout_ms = timeout_ms;
    }
    if cli.simulate {
        config.driver = DriverConfig::Virtual;
    }

    config.validate()?;
    Ok(config)
}

fn spawn_simulator(
    bus: &VirtualBus,
    addressing: AddressingMode,
    running: Arc<AtomicBool>,
) -> Result<tokio::task::JoinHandle<()>> {
    let dtcs = SIMULATED_DTCS
        .iter()
        .map(|code| code.parse::<DtcCode>())
        .collect::<Result<Vec<_>, _>>()?;
    let vin = SIMULATED_VIN
        .parse::<Vin>()
        .map_err(|len| anyhow::anyhow!("Simulated VIN has {} bytes", len))?;

    let config = EcuConfig {
        addressing,
        vin: Some(vin),
        dtcs: Some(dtcs),
        ..Default::default()
    };
    let mut simulator = EcuSimulator::new(bus.endpoint(), &config);
    info!("Simulated ECU attached to virtual bus");

    Ok(tokio::spawn(async move {
        simulator.run(running).await;
    }))
}
