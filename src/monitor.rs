//! The monitor loop.
//!
//! One cooperative loop owns the source, both logs, the alert sink, and all
//! mutable state. Each poll either processes a line or evaluates the silence
//! watchdog. Per-line anomalies are handled here and never stop the loop;
//! only source/log I/O failures and the shutdown signal end it. Both logs
//! are closed and the source released on every exit path.

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::alert::AlertSink;
use crate::classifier::{Classifier, Observation};
use crate::error::MonitorError;
use crate::event_log::EventLog;
use crate::source::{LineSource, RawLine};
use crate::watchdog::{SilenceWatchdog, SILENCE_WINDOW};

/// Latest ECC error counts reported by the target.
///
/// Values mirror the last report; they are overwritten, never accumulated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterState {
    /// Last reported single-bit error count.
    pub single_bit_errors: u64,
    /// Last reported double-bit error count.
    pub double_bit_errors: u64,
}

impl CounterState {
    /// Apply a counter observation, returning the log message for it.
    /// Non-counter observations leave the state untouched.
    pub fn apply(&mut self, observation: Observation) -> Option<String> {
        match observation {
            Observation::SingleBitCount(n) => {
                self.single_bit_errors = n;
                Some(format!("Updated Single Bit Errors: {n}"))
            }
            Observation::DoubleBitCount(n) => {
                self.double_bit_errors = n;
                Some(format!("Updated Double Bit Errors: {n}"))
            }
            Observation::FailureMarker | Observation::NoMatch => None,
        }
    }
}

/// Everything the loop mutates.
#[derive(Debug, Clone)]
pub struct MonitorState {
    /// Latest counter values.
    pub counters: CounterState,
    /// Silence tracking.
    pub watchdog: SilenceWatchdog,
}

/// What a single poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// A readable line was processed.
    Line,
    /// A line arrived but was not valid text.
    Unreadable,
    /// No line arrived and the stream is within its silence window.
    Idle,
    /// No line arrived and the silence alert fired.
    Silent,
}

/// Drives a [`LineSource`] through classification, logging, and alerting.
pub struct Monitor<S> {
    source: S,
    classifier: Classifier,
    log: EventLog,
    alert: Box<dyn AlertSink>,
    state: MonitorState,
}

impl<S: LineSource> Monitor<S> {
    /// Assemble a monitor from already-opened resources.
    pub fn new(source: S, log: EventLog, alert: Box<dyn AlertSink>) -> Self {
        Self {
            source,
            classifier: Classifier::new(),
            log,
            alert,
            state: MonitorState {
                counters: CounterState::default(),
                watchdog: SilenceWatchdog::new(Instant::now()),
            },
        }
    }

    /// Current state.
    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// Write the startup entry to the alert log.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::LogWrite`] if the write fails.
    pub fn start(&mut self) -> Result<(), MonitorError> {
        let entry = self.log.record_startup()?;
        info!(started_at = %entry.timestamp, "monitor started");
        Ok(())
    }

    /// Poll the source once and process the result.
    ///
    /// # Errors
    ///
    /// Returns source read errors and log write errors.
    pub async fn tick(&mut self) -> Result<Tick, MonitorError> {
        let polled = self.source.try_read_line().await?;
        self.process(polled)
    }

    /// Run until `shutdown` carries `true` (or its sender is dropped) or the
    /// source reaches end of stream, then close the logs and release the source.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the loop, or a failure closing the logs.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<MonitorState, MonitorError> {
        let outcome = self.drive(&mut shutdown).await;

        let Self {
            source, log, state, ..
        } = self;
        drop(source);
        let closed = log.close();
        debug!("source released and logs closed");

        outcome?;
        closed?;
        Ok(state)
    }

    async fn drive(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<(), MonitorError> {
        self.start()?;

        loop {
            // Only the read is raced against shutdown; processing is never interrupted mid-write.
            let polled = tokio::select! {
                biased;
                () = shutdown_requested(shutdown) => {
                    info!("shutdown requested");
                    return Ok(());
                }
                polled = self.source.try_read_line() => polled,
            };
            match polled {
                Ok(polled) => {
                    self.process(polled)?;
                }
                Err(MonitorError::SourceClosed) => {
                    info!("source reached end of stream");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn process(&mut self, polled: Option<RawLine>) -> Result<Tick, MonitorError> {
        let now = Instant::now();
        match polled {
            Some(raw) => {
                self.state.watchdog.record_receipt(now);
                self.handle_line(&raw)
            }
            None => self.check_silence(now),
        }
    }

    fn handle_line(&mut self, raw: &RawLine) -> Result<Tick, MonitorError> {
        let line = match raw.decode() {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, len = raw.as_bytes().len(), "unreadable line");
                self.log.record_event("ERROR: Unreadable serial data received")?;
                self.alert.notify();
                return Ok(Tick::Unreadable);
            }
        };

        debug!(line = %line, "line received");
        self.log.record_raw(&line)?;

        for observation in self.classifier.classify(&line) {
            if observation == Observation::FailureMarker {
                warn!(line = %line, "failure reported by target");
                self.log.record_event(line.as_str())?;
                self.alert.notify();
            } else if let Some(message) = self.state.counters.apply(observation) {
                info!(
                    single_bit_errors = self.state.counters.single_bit_errors,
                    double_bit_errors = self.state.counters.double_bit_errors,
                    "error counters updated"
                );
                self.log.record_event(message)?;
            }
        }

        Ok(Tick::Line)
    }

    fn check_silence(&mut self, now: Instant) -> Result<Tick, MonitorError> {
        let Some(timeout) = self.state.watchdog.check(now) else {
            return Ok(Tick::Idle);
        };

        let idle_ms = u64::try_from(timeout.idle.as_millis()).unwrap_or(u64::MAX);
        warn!(idle_ms, "no data received");
        self.log.record_event(format!(
            "ERROR: No data received from UART for {} seconds",
            SILENCE_WINDOW.as_secs()
        ))?;
        self.alert.notify();
        Ok(Tick::Silent)
    }
}

/// Resolve once shutdown is requested or the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
