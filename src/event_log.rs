//! Append-only operator logs.
//!
//! Two plain-text files: the raw data log holds every decoded line verbatim,
//! the alert log holds one timestamped entry per notable event. Files are
//! opened in append mode and every write is synced before returning, so an
//! abrupt stop never loses an acknowledged entry. Uses synchronous `std::fs`
//! since these are small local writes.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::Instant;
use tracing::debug;

use crate::config::LogsConfig;
use crate::error::MonitorError;
use crate::source::DecodedLine;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Which log an entry goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// Verbatim decoded lines.
    RawData,
    /// Timestamped events.
    Alerts,
}

/// One alert log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Wall-clock time of the event.
    pub timestamp: DateTime<Local>,
    /// Time since the monitor started.
    pub elapsed: Duration,
    /// Event text.
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Elapsed: {}) - {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            format_elapsed(self.elapsed),
            self.message
        )
    }
}

/// Format a duration as `H:MM:SS`, with `.ffffff` microseconds when non-zero
/// and a `N day(s), ` prefix once a full day has passed.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    let micros = elapsed.subsec_micros();

    let mut text = match days {
        0 => String::new(),
        1 => "1 day, ".to_owned(),
        n => format!("{n} days, "),
    };
    text.push_str(&format!("{hours}:{minutes:02}:{seconds:02}"));
    if micros != 0 {
        text.push_str(&format!(".{micros:06}"));
    }
    text
}

/// An append-mode file that syncs after every record.
#[derive(Debug)]
struct LogFile {
    path: PathBuf,
    file: File,
}

impl LogFile {
    fn open(path: &Path) -> Result<Self, MonitorError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| MonitorError::OpenFile {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    fn append_line(&mut self, text: &str) -> Result<(), MonitorError> {
        let mut record = String::with_capacity(text.len().saturating_add(1));
        record.push_str(text);
        record.push('\n');
        self.file
            .write_all(record.as_bytes())
            .and_then(|()| self.file.sync_data())
            .map_err(|source| MonitorError::LogWrite {
                path: self.path.clone(),
                source,
            })
    }

    fn close(self) -> Result<(), MonitorError> {
        self.file
            .sync_all()
            .map_err(|source| MonitorError::LogWrite {
                path: self.path,
                source,
            })
    }
}

/// The raw data log and the alert log, opened together.
#[derive(Debug)]
pub struct EventLog {
    raw: LogFile,
    alerts: LogFile,
    started_at: DateTime<Local>,
    start: Instant,
    echo: bool,
}

impl EventLog {
    /// Open (creating if absent) both logs in append mode.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::OpenFile`] if either file cannot be opened.
    pub fn open(config: &LogsConfig) -> Result<Self, MonitorError> {
        let raw = LogFile::open(&config.data_log)?;
        let alerts = LogFile::open(&config.alert_log)?;
        debug!(
            data_log = %config.data_log.display(),
            alert_log = %config.alert_log.display(),
            "logs opened"
        );
        Ok(Self {
            raw,
            alerts,
            started_at: Local::now(),
            start: Instant::now(),
            echo: config.echo,
        })
    }

    /// Wall-clock time the log was opened.
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Build an entry stamped with the current time.
    pub fn entry(&self, message: impl Into<String>) -> LogEntry {
        LogEntry {
            timestamp: Local::now(),
            elapsed: self.start.elapsed(),
            message: message.into(),
        }
    }

    /// Append a formatted record to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::LogWrite`] if the write or sync fails.
    pub fn append(&mut self, target: LogTarget, text: &str) -> Result<(), MonitorError> {
        match target {
            LogTarget::RawData => self.raw.append_line(text),
            LogTarget::Alerts => self.alerts.append_line(text),
        }
    }

    /// Record a decoded line in the raw data log.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::LogWrite`] if the write fails.
    pub fn record_raw(&mut self, line: &DecodedLine) -> Result<(), MonitorError> {
        self.append(LogTarget::RawData, line.as_str())
    }

    /// Record a notable event in the alert log, echoing it to stdout when enabled.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::LogWrite`] if the write fails.
    pub fn record_event(&mut self, message: impl Into<String>) -> Result<LogEntry, MonitorError> {
        let entry = self.entry(message);
        let text = entry.to_string();
        if self.echo {
            println!("{text}");
        }
        self.append(LogTarget::Alerts, &text)?;
        Ok(entry)
    }

    /// Record the startup entry carrying the monitor start time.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::LogWrite`] if the write fails.
    pub fn record_startup(&mut self) -> Result<LogEntry, MonitorError> {
        let message = format!(
            "Script started at: {}",
            self.started_at.format(TIMESTAMP_FORMAT)
        );
        self.record_event(message)
    }

    /// Sync and close both logs. Both are closed even if the first fails.
    ///
    /// # Errors
    ///
    /// Returns the first [`MonitorError::LogWrite`] encountered.
    pub fn close(self) -> Result<(), MonitorError> {
        let raw = self.raw.close();
        let alerts = self.alerts.close();
        raw.and(alerts)
    }
}
