//! Errors that can stop the monitor.
//!
//! Only resource failures live here. Per-line anomalies (unreadable bytes,
//! failure markers, silence) are handled inside the loop and never surface
//! as a [`MonitorError`].

use std::path::PathBuf;

use thiserror::Error;

/// Fatal monitor errors.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The serial device could not be opened.
    #[error("failed to open serial device {device}: {source}")]
    OpenSource {
        /// Device path that was requested.
        device: String,
        /// Underlying serial port error.
        #[source]
        source: tokio_serial::Error,
    },

    /// A capture file or log file could not be opened.
    #[error("failed to open {}: {source}", path.display())]
    OpenFile {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Appending to a log file failed.
    #[error("failed to write to {}: {source}", path.display())]
    LogWrite {
        /// Log file that rejected the write.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading from the line source failed.
    #[error("failed to read from source: {0}")]
    Read(#[from] std::io::Error),

    /// The line source reached end of stream.
    #[error("source closed")]
    SourceClosed,
}
