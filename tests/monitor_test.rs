//! Tests for the monitor loop: classification, counters, logging, alerts,
//! silence detection, and shutdown.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use starrisc_monitor::alert::AlertSink;
use starrisc_monitor::config::LogsConfig;
use starrisc_monitor::error::MonitorError;
use starrisc_monitor::event_log::EventLog;
use starrisc_monitor::monitor::{CounterState, Monitor, Tick};
use starrisc_monitor::source::{LineSource, RawLine};
use starrisc_monitor::watchdog::WatchdogState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Plays back a fixed script. `None` entries wait out the read timeout.
/// Closes once the script is exhausted.
struct ScriptedSource {
    script: VecDeque<Option<RawLine>>,
}

impl ScriptedSource {
    fn new(script: Vec<Option<RawLine>>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

#[async_trait]
impl LineSource for ScriptedSource {
    async fn try_read_line(&mut self) -> Result<Option<RawLine>, MonitorError> {
        match self.script.pop_front() {
            Some(Some(line)) => Ok(Some(line)),
            Some(None) => {
                tokio::time::sleep(READ_TIMEOUT).await;
                Ok(None)
            }
            None => Err(MonitorError::SourceClosed),
        }
    }
}

/// Counts alerts.
#[derive(Clone, Default)]
struct RecordingAlert {
    count: Arc<AtomicUsize>,
}

impl RecordingAlert {
    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl AlertSink for RecordingAlert {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn notify(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

fn line(text: &str) -> Option<RawLine> {
    Some(RawLine::new(text))
}

fn garbage() -> Option<RawLine> {
    Some(RawLine::new(vec![0xff, 0xfe, 0x80, b'\r']))
}

fn idle(n: usize) -> Vec<Option<RawLine>> {
    vec![None; n]
}

fn logs_config(dir: &Path) -> LogsConfig {
    LogsConfig {
        data_log: dir.join("serial_data.txt"),
        alert_log: dir.join("error_log.txt"),
        echo: false,
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("read log")
        .lines()
        .map(str::to_owned)
        .collect()
}

/// Message part of an alert log entry (after the timestamp prefix).
fn message(entry: &str) -> &str {
    entry
        .split_once(") - ")
        .map(|(_, msg)| msg)
        .expect("entry has prefix")
}

fn messages(path: &Path) -> Vec<String> {
    read_lines(path)
        .iter()
        .map(|l| message(l).to_owned())
        .collect()
}

fn build(
    dir: &Path,
    script: Vec<Option<RawLine>>,
) -> (Monitor<ScriptedSource>, RecordingAlert, LogsConfig) {
    let config = logs_config(dir);
    let log = EventLog::open(&config).expect("open logs");
    let alert = RecordingAlert::default();
    let monitor = Monitor::new(
        ScriptedSource::new(script),
        log,
        Box::new(alert.clone()),
    );
    (monitor, alert, config)
}

async fn tick_n(monitor: &mut Monitor<ScriptedSource>, n: usize) -> Vec<Tick> {
    let mut ticks = Vec::with_capacity(n);
    for _ in 0..n {
        ticks.push(monitor.tick().await.expect("tick"));
    }
    ticks
}

// ---------------------------------------------------------------------------
// Classification and counters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn end_to_end_sequence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (monitor, alert, config) = build(
        dir.path(),
        vec![
            line("Single Bit Errors: 5"),
            garbage(),
            line("Double Bit Errors: 2"),
            line("TEST FAILED on core 3"),
        ],
    );
    let (_tx, rx) = watch::channel(false);

    let state = monitor.run(rx).await.expect("run to end of stream");

    assert_eq!(
        state.counters,
        CounterState {
            single_bit_errors: 5,
            double_bit_errors: 2,
        }
    );
    // Only the decode failure and the failure marker alert.
    assert_eq!(alert.count(), 2);

    assert_eq!(
        read_lines(&config.data_log),
        vec![
            "Single Bit Errors: 5",
            "Double Bit Errors: 2",
            "TEST FAILED on core 3",
        ]
    );

    let msgs = messages(&config.alert_log);
    assert_eq!(msgs.len(), 5);
    assert!(msgs[0].starts_with("Script started at: "));
    assert_eq!(
        &msgs[1..],
        &[
            "Updated Single Bit Errors: 5",
            "ERROR: Unreadable serial data received",
            "Updated Double Bit Errors: 2",
            "TEST FAILED on core 3",
        ]
    );
}

#[tokio::test]
async fn counters_are_overwritten_not_accumulated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut monitor, alert, _config) = build(
        dir.path(),
        vec![line("Single Bit Errors: 3"), line("Single Bit Errors: 1")],
    );

    tick_n(&mut monitor, 2).await;

    assert_eq!(monitor.state().counters.single_bit_errors, 1);
    assert_eq!(monitor.state().counters.double_bit_errors, 0);
    assert_eq!(alert.count(), 0);
}

#[tokio::test]
async fn repeated_counter_line_logs_twice() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut monitor, _alert, config) = build(
        dir.path(),
        vec![line("Double Bit Errors: 4"), line("Double Bit Errors: 4")],
    );

    tick_n(&mut monitor, 2).await;

    assert_eq!(monitor.state().counters.double_bit_errors, 4);
    assert_eq!(
        messages(&config.alert_log),
        vec!["Updated Double Bit Errors: 4", "Updated Double Bit Errors: 4"]
    );
    assert_eq!(read_lines(&config.data_log).len(), 2);
}

#[tokio::test]
async fn failure_marker_alerts_without_touching_counters() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut monitor, alert, config) =
        build(dir.path(), vec![line("march C- FAILED at 0x8000_0040")]);

    assert_eq!(tick_n(&mut monitor, 1).await, vec![Tick::Line]);

    assert_eq!(monitor.state().counters, CounterState::default());
    assert_eq!(alert.count(), 1);
    assert_eq!(
        messages(&config.alert_log),
        vec!["march C- FAILED at 0x8000_0040"]
    );
}

#[tokio::test]
async fn failure_and_counter_on_one_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut monitor, alert, config) =
        build(dir.path(), vec![line("FAILED: Single Bit Errors: 7")]);

    tick_n(&mut monitor, 1).await;

    assert_eq!(monitor.state().counters.single_bit_errors, 7);
    assert_eq!(alert.count(), 1);
    assert_eq!(
        messages(&config.alert_log),
        vec!["FAILED: Single Bit Errors: 7", "Updated Single Bit Errors: 7"]
    );
}

#[tokio::test]
async fn unmatched_lines_only_reach_raw_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut monitor, alert, config) = build(
        dir.path(),
        vec![line("Booting hart 0"), line("pass 12 ok")],
    );

    tick_n(&mut monitor, 2).await;

    assert_eq!(read_lines(&config.data_log), vec!["Booting hart 0", "pass 12 ok"]);
    assert!(read_lines(&config.alert_log).is_empty());
    assert_eq!(alert.count(), 0);
}

#[tokio::test]
async fn decode_failure_is_isolated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut monitor, alert, config) = build(
        dir.path(),
        vec![line("Single Bit Errors: 2"), garbage()],
    );

    assert_eq!(
        tick_n(&mut monitor, 2).await,
        vec![Tick::Line, Tick::Unreadable]
    );

    assert_eq!(monitor.state().counters.single_bit_errors, 2);
    assert_eq!(alert.count(), 1);
    assert_eq!(read_lines(&config.data_log), vec!["Single Bit Errors: 2"]);
    assert_eq!(
        messages(&config.alert_log),
        vec![
            "Updated Single Bit Errors: 2",
            "ERROR: Unreadable serial data received",
        ]
    );
}

// ---------------------------------------------------------------------------
// Silence detection
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn silence_fires_once_per_window() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut monitor, alert, config) = build(dir.path(), idle(12));

    let ticks = tick_n(&mut monitor, 12).await;

    // One-second polls: idle exceeds five seconds at polls 6 and 12.
    let silent: Vec<usize> = ticks
        .iter()
        .enumerate()
        .filter(|(_, t)| **t == Tick::Silent)
        .map(|(i, _)| i.saturating_add(1))
        .collect();
    assert_eq!(silent, vec![6, 12]);
    assert_eq!(alert.count(), 2);
    assert_eq!(
        messages(&config.alert_log),
        vec![
            "ERROR: No data received from UART for 5 seconds",
            "ERROR: No data received from UART for 5 seconds",
        ]
    );
    assert_eq!(monitor.state().watchdog.state(), WatchdogState::Alerted);
}

#[tokio::test(start_paused = true)]
async fn any_line_resets_silence_window() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut script = idle(5);
    script.push(garbage());
    script.extend(idle(5));
    script.push(line("still alive"));
    script.extend(idle(6));
    let (mut monitor, alert, _config) = build(dir.path(), script);

    let ticks = tick_n(&mut monitor, 18).await;

    // Silence only after the final six idle polls.
    let silent_count = ticks.iter().filter(|t| **t == Tick::Silent).count();
    assert_eq!(silent_count, 1);
    assert_eq!(ticks.last(), Some(&Tick::Silent));
    // One alert for the unreadable line, one for silence.
    assert_eq!(alert.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn receipt_after_alert_returns_to_quiet() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut script = idle(6);
    script.push(line("back online"));
    let (mut monitor, _alert, _config) = build(dir.path(), script);

    tick_n(&mut monitor, 6).await;
    assert_eq!(monitor.state().watchdog.state(), WatchdogState::Alerted);

    tick_n(&mut monitor, 1).await;
    assert_eq!(monitor.state().watchdog.state(), WatchdogState::Quiet);
}

// ---------------------------------------------------------------------------
// Shutdown and cleanup
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn shutdown_signal_stops_loop_and_closes_logs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (monitor, _alert, config) = build(dir.path(), idle(1_000));
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(monitor.run(rx));
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    tx.send(true).expect("send shutdown");

    let state = handle.await.expect("join").expect("clean shutdown");
    assert_eq!(state.counters, CounterState::default());

    let msgs = messages(&config.alert_log);
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].starts_with("Script started at: "));
}

#[tokio::test]
async fn shutdown_before_first_poll_still_writes_startup_entry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (monitor, _alert, config) = build(dir.path(), vec![line("never read")]);
    let (tx, rx) = watch::channel(false);
    tx.send(true).expect("send shutdown");

    monitor.run(rx).await.expect("clean shutdown");

    assert!(read_lines(&config.data_log).is_empty());
    assert_eq!(read_lines(&config.alert_log).len(), 1);
}

#[tokio::test]
async fn dropped_shutdown_sender_stops_loop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (monitor, _alert, _config) = build(dir.path(), idle(1_000));
    let (tx, rx) = watch::channel(false);
    drop(tx);

    monitor.run(rx).await.expect("clean shutdown");
}

#[tokio::test]
async fn read_error_stops_loop_and_keeps_logged_data() {
    struct FailingSource {
        served: bool,
    }

    #[async_trait]
    impl LineSource for FailingSource {
        async fn try_read_line(&mut self) -> Result<Option<RawLine>, MonitorError> {
            if self.served {
                return Err(MonitorError::Read(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "device unplugged",
                )));
            }
            self.served = true;
            Ok(Some(RawLine::new("Single Bit Errors: 9")))
        }
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let config = logs_config(dir.path());
    let log = EventLog::open(&config).expect("open logs");
    let monitor = Monitor::new(
        FailingSource { served: false },
        log,
        Box::new(RecordingAlert::default()),
    );
    let (_tx, rx) = watch::channel(false);

    let err = monitor.run(rx).await.err().expect("read error surfaces");
    assert!(matches!(err, MonitorError::Read(_)));

    assert_eq!(read_lines(&config.data_log), vec!["Single Bit Errors: 9"]);
    assert_eq!(
        messages(&config.alert_log).last().map(String::as_str),
        Some("Updated Single Bit Errors: 9")
    );
}
