//! StarRISC Monitor CLI entry point.
//!
//! Provides `run`, `replay`, and `ports` subcommands for monitoring a live
//! serial device, replaying a captured stream, or listing serial ports.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use starrisc_monitor::alert;
use starrisc_monitor::config::{load_monitor_config, AlertMode, MonitorConfig};
use starrisc_monitor::event_log::EventLog;
use starrisc_monitor::logging::{self, LoggingGuard};
use starrisc_monitor::monitor::{Monitor, MonitorState};
use starrisc_monitor::source::{self, LineSource};

/// StarRISC Monitor — serial-line watchdog for RISC-V memory test targets.
#[derive(Parser)]
#[command(name = "starrisc-monitor", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Monitor a serial device until interrupted.
    Run {
        /// Serial device path (overrides config).
        #[arg(long)]
        device: Option<String>,
        /// Baud rate (overrides config).
        #[arg(long)]
        baud: Option<u32>,
        /// Shared options.
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Feed a captured byte stream through the monitor.
    Replay {
        /// Capture file to replay.
        file: PathBuf,
        /// Shared options.
        #[command(flatten)]
        common: CommonArgs,
    },
    /// List serial ports visible to this host.
    Ports,
}

/// Options shared by `run` and `replay`.
#[derive(Args)]
struct CommonArgs {
    /// Path to a `monitor.toml` configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Raw data log path (overrides config).
    #[arg(long)]
    data_log: Option<PathBuf>,
    /// Alert log path (overrides config).
    #[arg(long)]
    alert_log: Option<PathBuf>,
    /// Disable audible/visual alerts.
    #[arg(long)]
    no_alert: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            device,
            baud,
            common,
        } => {
            let mut config = resolve_config(&common)?;
            if let Some(device) = device {
                config.source.device = device;
            }
            if let Some(baud) = baud {
                config.source.baud_rate = baud;
            }
            config.validate()?;
            handle_run(config).await
        }
        Command::Replay { file, common } => {
            let config = resolve_config(&common)?;
            config.validate()?;
            handle_replay(&file, config).await
        }
        Command::Ports => handle_ports(),
    }
}

/// Monitor the configured serial device until Ctrl-C.
async fn handle_run(config: MonitorConfig) -> anyhow::Result<()> {
    let _logging_guard = init_logging(&config)?;

    // The device is opened first so a missing target never touches the logs.
    let source = source::open_serial(&config.source).context("cannot start monitor")?;

    info!(
        device = %config.source.device,
        baud_rate = config.source.baud_rate,
        "monitoring serial device"
    );
    monitor(source, config).await
}

/// Replay a capture file through the monitor.
async fn handle_replay(file: &Path, config: MonitorConfig) -> anyhow::Result<()> {
    let _logging_guard = init_logging(&config)?;

    let source = source::open_capture(file, config.source.read_timeout())
        .await
        .context("cannot start replay")?;

    info!(file = %file.display(), "replaying capture");
    monitor(source, config).await
}

/// Print every serial port the host reports.
fn handle_ports() -> anyhow::Result<()> {
    logging::init_console();

    let ports = source::available_ports().context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

/// Open the logs, run the loop until Ctrl-C or end of stream, and report.
async fn monitor<S: LineSource>(source: S, config: MonitorConfig) -> anyhow::Result<()> {
    let log = EventLog::open(&config.logs).context("cannot open logs")?;
    let alert = alert::from_config(&config.alert);
    info!(alert = %alert.name(), "alert sink ready");
    let monitor = Monitor::new(source, log, alert);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C, monitor must be killed");
            // Holding the sender keeps the monitor running.
            std::future::pending::<()>().await;
        }
        let _ = shutdown_tx.send(true);
    });

    let state = monitor.run(shutdown_rx).await;
    println!("Monitoring stopped.");
    let state = state.context("monitor stopped on error")?;
    report(&state);
    Ok(())
}

fn report(state: &MonitorState) {
    println!(
        "Final counters: Single Bit Errors: {}, Double Bit Errors: {}",
        state.counters.single_bit_errors, state.counters.double_bit_errors
    );
    info!(
        single_bit_errors = state.counters.single_bit_errors,
        double_bit_errors = state.counters.double_bit_errors,
        "final error counters"
    );
}

/// Load the config file if given, then apply the shared CLI overrides.
fn resolve_config(args: &CommonArgs) -> anyhow::Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => load_monitor_config(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => MonitorConfig::default(),
    };

    if let Some(path) = &args.data_log {
        config.logs.data_log = path.clone();
    }
    if let Some(path) = &args.alert_log {
        config.logs.alert_log = path.clone();
    }
    if args.no_alert {
        config.alert.mode = AlertMode::None;
    }
    Ok(config)
}

fn init_logging(config: &MonitorConfig) -> anyhow::Result<Option<LoggingGuard>> {
    match &config.diagnostics.dir {
        Some(dir) => logging::init_with_dir(dir).map(Some),
        None => {
            logging::init_console();
            Ok(None)
        }
    }
}
