//! Timeout-bounded line sources.
//!
//! A [`LineSource`] hands out one terminated line per call, or `None` when no
//! complete line arrived within the read timeout. Bytes of an unfinished line
//! are kept between calls, so a poll that times out never loses data.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::error::MonitorError;

/// Longest line kept in memory before it is emitted without a terminator.
pub const MAX_LINE_LEN: usize = 64 * 1024;

const READ_CHUNK: usize = 256;

/// One line of bytes exactly as received, without the `\n` terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine(Vec<u8>);

impl RawLine {
    /// Wrap received bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The received bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decode as UTF-8 text with trailing whitespace (including `\r`) removed.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the bytes are not valid UTF-8.
    pub fn decode(&self) -> Result<DecodedLine, DecodeError> {
        let text = std::str::from_utf8(&self.0)?;
        Ok(DecodedLine(text.trim_end().to_owned()))
    }
}

/// A received line that decoded to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLine(String);

impl DecodedLine {
    /// The decoded text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DecodedLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Received bytes were not valid text.
#[derive(Debug, thiserror::Error)]
#[error("line is not valid UTF-8: {0}")]
pub struct DecodeError(#[from] std::str::Utf8Error);

/// A byte-oriented input channel polled with a bounded wait.
#[async_trait]
pub trait LineSource: Send {
    /// Return the next complete line, or `None` if none arrived within the
    /// source's read timeout.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Read`] on I/O failure and
    /// [`MonitorError::SourceClosed`] once the stream has ended.
    async fn try_read_line(&mut self) -> Result<Option<RawLine>, MonitorError>;
}

/// Line source over any async byte reader.
pub struct StreamSource<R> {
    reader: R,
    pending: Vec<u8>,
    read_timeout: Duration,
}

impl<R> StreamSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Create a source that waits at most `read_timeout` per poll.
    pub fn new(reader: R, read_timeout: Duration) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            read_timeout,
        }
    }

    /// Split the first terminated line off the pending buffer.
    fn take_buffered_line(&mut self) -> Option<RawLine> {
        let newline = self.pending.iter().position(|b| *b == b'\n')?;
        let rest = self.pending.split_off(newline.saturating_add(1));
        let mut line = std::mem::replace(&mut self.pending, rest);
        line.truncate(newline);
        Some(RawLine(line))
    }

    fn take_all(&mut self) -> RawLine {
        RawLine(std::mem::take(&mut self.pending))
    }
}

#[async_trait]
impl<R> LineSource for StreamSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn try_read_line(&mut self) -> Result<Option<RawLine>, MonitorError> {
        if let Some(line) = self.take_buffered_line() {
            return Ok(Some(line));
        }

        let deadline = Instant::now()
            .checked_add(self.read_timeout)
            .unwrap_or_else(Instant::now);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let read = tokio::time::timeout_at(deadline, self.reader.read(&mut chunk)).await;
            let Ok(read) = read else {
                return Ok(None);
            };

            match read {
                Ok(0) => {
                    // End of stream: flush an unterminated tail once, then report closure.
                    if self.pending.is_empty() {
                        return Err(MonitorError::SourceClosed);
                    }
                    return Ok(Some(self.take_all()));
                }
                Ok(n) => {
                    self.pending.extend_from_slice(chunk.get(..n).unwrap_or_default());
                    if let Some(line) = self.take_buffered_line() {
                        return Ok(Some(line));
                    }
                    if self.pending.len() > MAX_LINE_LEN {
                        warn!(
                            len = self.pending.len(),
                            "line exceeds limit, emitting unterminated"
                        );
                        return Ok(Some(self.take_all()));
                    }
                }
                // Serial drivers report an expired port timeout this way.
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => return Ok(None),
                Err(e) => return Err(MonitorError::Read(e)),
            }
        }
    }
}

/// Line source backed by a serial device.
pub type SerialSource = StreamSource<tokio_serial::SerialStream>;

/// Open the configured serial device.
///
/// # Errors
///
/// Returns [`MonitorError::OpenSource`] if the device cannot be opened.
pub fn open_serial(config: &SourceConfig) -> Result<SerialSource, MonitorError> {
    let read_timeout = config.read_timeout();
    let stream = tokio_serial::new(&config.device, config.baud_rate)
        .timeout(read_timeout)
        .open_native_async()
        .map_err(|source| MonitorError::OpenSource {
            device: config.device.clone(),
            source,
        })?;

    debug!(device = %config.device, baud_rate = config.baud_rate, "serial device opened");
    Ok(StreamSource::new(stream, read_timeout))
}

/// Line source backed by a captured byte stream on disk.
pub type CaptureSource = StreamSource<tokio::fs::File>;

/// Open a capture file for replay.
///
/// # Errors
///
/// Returns [`MonitorError::OpenFile`] if the file cannot be opened.
pub async fn open_capture(
    path: &Path,
    read_timeout: Duration,
) -> Result<CaptureSource, MonitorError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|source| MonitorError::OpenFile {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(StreamSource::new(file, read_timeout))
}

/// Name of every serial port visible to the host.
///
/// # Errors
///
/// Returns an error if the platform port enumeration fails.
pub fn available_ports() -> Result<Vec<String>, tokio_serial::Error> {
    let ports = tokio_serial::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
