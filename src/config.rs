//! Configuration loading for the monitor.
//!
//! Loads an optional `monitor.toml` with per-section defaults. All sections
//! use `#[serde(default)]` so a minimal or empty config file is valid. The
//! silence window is a fixed constant and deliberately absent here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Top-level monitor configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitorConfig {
    /// Serial connection parameters.
    #[serde(default)]
    pub source: SourceConfig,

    /// Durable log destinations.
    #[serde(default)]
    pub logs: LogsConfig,

    /// Operator alert mechanism.
    #[serde(default)]
    pub alert: AlertConfig,

    /// Diagnostic tracing output.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// Serial connection parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Serial device path (e.g. `/dev/ttyUSB0`, `COM3`).
    #[serde(default = "default_device")]
    pub device: String,

    /// Line speed in baud.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Longest wait for a line per poll, in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl SourceConfig {
    /// Per-poll read timeout.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

/// Durable log destinations.
#[derive(Debug, Clone, Deserialize)]
pub struct LogsConfig {
    /// Every decoded line, verbatim.
    #[serde(default = "default_data_log")]
    pub data_log: PathBuf,

    /// Timestamped notable events.
    #[serde(default = "default_alert_log")]
    pub alert_log: PathBuf,

    /// Mirror alert log entries to stdout.
    #[serde(default = "default_true")]
    pub echo: bool,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            data_log: default_data_log(),
            alert_log: default_alert_log(),
            echo: true,
        }
    }
}

/// Which alert mechanism to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertMode {
    /// Platform default.
    #[default]
    Auto,
    /// Terminal bell on stdout.
    Bell,
    /// Run the configured command.
    Command,
    /// No alert.
    None,
}

/// Operator alert mechanism.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertConfig {
    /// Alert mechanism.
    #[serde(default)]
    pub mode: AlertMode,

    /// Program and arguments for [`AlertMode::Command`].
    #[serde(default)]
    pub command: Vec<String>,
}

/// Diagnostic tracing output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagnosticsConfig {
    /// Directory for daily-rotated JSON diagnostics. Stderr only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl MonitorConfig {
    /// Validate that configuration values are within sane bounds.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.source.device.trim().is_empty(),
            "source.device must not be empty"
        );
        anyhow::ensure!(self.source.baud_rate > 0, "source.baud_rate must be > 0");
        anyhow::ensure!(
            (10..=60_000).contains(&self.source.read_timeout_ms),
            "source.read_timeout_ms must be in [10, 60000]"
        );
        anyhow::ensure!(
            !self.logs.data_log.as_os_str().is_empty()
                && !self.logs.alert_log.as_os_str().is_empty(),
            "logs.data_log and logs.alert_log must not be empty"
        );
        anyhow::ensure!(
            self.logs.data_log != self.logs.alert_log,
            "logs.data_log and logs.alert_log must be different files"
        );
        if self.alert.mode == AlertMode::Command {
            anyhow::ensure!(
                self.alert.command.first().is_some_and(|p| !p.is_empty()),
                "alert.command must name a program when alert.mode = \"command\""
            );
        }
        Ok(())
    }
}

/// Load monitor configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or fails validation.
pub fn load_monitor_config(path: &Path) -> anyhow::Result<MonitorConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read monitor config at {}", path.display()))?;
    let config: MonitorConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse monitor config at {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

// Default value functions for serde.

fn default_device() -> String {
    "/dev/ttyUSB0".to_owned()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_data_log() -> PathBuf {
    PathBuf::from("serial_data.txt")
}

fn default_alert_log() -> PathBuf {
    PathBuf::from("error_log.txt")
}

fn default_true() -> bool {
    true
}
