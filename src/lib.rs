//! StarRISC Monitor — watches a RISC-V memory test target over its serial port.
//!
//! Reads lines from the target, classifies them (failure markers and ECC
//! error counters), keeps the latest counter values, appends everything to
//! two durable text logs, and raises an alert on failures, unreadable data,
//! and stream silence.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Operator alert capability and its platform variants.
pub mod alert;
/// Line classification rules.
pub mod classifier;
/// Configuration loading and validation.
pub mod config;
/// Error taxonomy for the monitor.
pub mod error;
/// Append-only raw data and alert logs.
pub mod event_log;
/// Diagnostic tracing setup.
pub mod logging;
/// The polling loop and the state it owns.
pub mod monitor;
/// Timeout-bounded line sources (serial port, capture files).
pub mod source;
/// Silence detection.
pub mod watchdog;
