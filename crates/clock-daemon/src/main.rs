//! FPGA clock daemon entry point.
//!
//! Brings up the clock driver on the in-process host bus, drives the sync
//! interrupt from a periodic ticker and services read queries until asked
//! to stop.

mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use clock_common::config::{ClockConfig, PortBackend};
use clock_common::error::ClockResult;
use clock_driver::read_interface::READING_LEN;
use clock_driver::simulated::{LatchingPeripheral, SimulatedBus};
use clock_driver::{ClockDriver, ClockReading, IrqReturn, PortIo, RawPort, SystemClock, Ticker};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::signals::{wait_for_shutdown, SignalHandler};

/// FPGA clock daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "fpga-clockd",
    about = "FPGA clock daemon - keeps the peripheral clock synchronized with host time",
    version,
    long_about = None
)]
struct Args {
    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use the simulated peripheral instead of real port I/O.
    #[arg(long, short = 's')]
    simulated: bool,

    /// Sync ticks to run before exiting (0 = until signaled).
    #[arg(long, default_value = "0")]
    max_ticks: u64,

    /// Print the final reading as JSON.
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

/// Final report printed on exit.
#[derive(Debug, Serialize)]
struct Report {
    driver: String,
    reading: ClockReading,
    time: String,
    syncs: u64,
    ticks: u64,
}

const CONFIG_ENV: &str = "FPGA_CLOCK_CONFIG";

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting FPGA clock daemon");

    let mut config = load_config(&args)?;
    if args.simulated {
        config.port.backend = PortBackend::Simulated;
    }

    info!(
        backend = ?config.port.backend,
        interval = %humantime::format_duration(config.sync.interval),
        timezone = ?config.sync.timezone,
        "Configuration loaded"
    );

    let signal_handler = SignalHandler::new().context("Failed to set up signal handlers")?;

    run_daemon(&config, &signal_handler, &args)
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!("fpga_clockd={level},clock_driver={level},clock_common={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `FPGA_CLOCK_CONFIG` environment variable
/// 3. `/etc/fpga-clock/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(args: &Args) -> Result<ClockConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return ClockConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from {CONFIG_ENV}");
            return ClockConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from {CONFIG_ENV}={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "{CONFIG_ENV} set but file does not exist, checking other locations"
        );
    }

    for path in ["/etc/fpga-clock/config.toml", "config/default.toml"] {
        let config_path = PathBuf::from(path);
        if config_path.exists() {
            info!(?config_path, "Loading config");
            return ClockConfig::from_file(&config_path)
                .with_context(|| format!("Failed to load config from {config_path:?}"));
        }
    }

    info!("No config file found, using built-in defaults");
    Ok(ClockConfig::default())
}

/// Create the port backend selected by configuration.
fn create_port(config: &ClockConfig) -> Box<dyn PortIo> {
    let base = config.device.port_base;
    match config.port.backend {
        PortBackend::Simulated => {
            info!(port = base, "Using simulated clock peripheral");
            Box::new(LatchingPeripheral::new(base))
        }
        PortBackend::Raw => {
            info!(port = base, "Using raw port I/O");
            Box::new(RawPort::new(base))
        }
    }
}

/// Bring the driver up, run until shutdown, tear it down.
fn run_daemon(config: &ClockConfig, signal_handler: &SignalHandler, args: &Args) -> Result<()> {
    let bus = Arc::new(SimulatedBus::new());
    let device = &config.device;

    let driver = ClockDriver::init(
        device,
        bus.clone(),
        create_port(config),
        SystemClock::new(config.sync.timezone),
    )
    .context("Failed to initialize clock driver")?;

    let mut ticker = Ticker::new(config.sync.interval);
    {
        let bus = Arc::clone(&bus);
        let irq = device.irq;
        ticker
            .start(move || {
                if bus.raise_irq(irq) == IrqReturn::None {
                    warn!(irq, "Sync interrupt not handled");
                }
            })
            .context("Failed to start sync ticker")?;
    }

    info!(
        driver = %device.name,
        every = %humantime::format_duration(ticker.interval()),
        "Synchronizing, entering main loop"
    );

    while !wait_for_shutdown(signal_handler, Duration::from_millis(100)) {
        if signal_handler.take_report_request() {
            match query(&bus, config) {
                Ok(reading) => {
                    info!(%reading, syncs = driver.sync_handler().syncs(), "Peripheral time");
                }
                Err(e) => error!(error = %e, "Clock attribute read failed"),
            }
        }

        if args.max_ticks > 0 && ticker.ticks() >= args.max_ticks {
            info!(ticks = ticker.ticks(), "Maximum tick count reached");
            signal_handler.request_shutdown();
        }
    }

    info!("Shutting down...");
    ticker.stop();

    let reading = query(&bus, config).context("Failed to read clock attribute")?;
    let report = Report {
        driver: device.name.clone(),
        reading,
        time: reading.to_string(),
        syncs: driver.sync_handler().syncs(),
        ticks: ticker.ticks(),
    };

    driver.teardown().context("Failed to tear down clock driver")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} {}", report.driver, report.time);
    }

    info!(
        syncs = report.syncs,
        ticks = report.ticks,
        signals = signal_handler.state().signal_count(),
        "Daemon shutdown complete"
    );
    Ok(())
}

/// Read the clock attribute through the host bus.
fn query(bus: &SimulatedBus, config: &ClockConfig) -> ClockResult<ClockReading> {
    let mut buf = [0u8; READING_LEN];
    bus.read_attribute(&config.device.name, &config.device.attribute, &mut buf)?;
    Ok(ClockReading::from_bytes(buf))
}
