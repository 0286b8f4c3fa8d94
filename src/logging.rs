//! Diagnostic tracing for the monitor process itself.
//!
//! Distinct from the operator logs in [`crate::event_log`]: these records
//! describe what the monitor is doing (device opened, sink chosen, lines
//! rejected) and are filtered by `RUST_LOG`, default `info`.
//!
//! `run` and `replay` call [`init_with_dir`] when `[diagnostics] dir` is set,
//! which keeps a daily JSON trail next to the stderr output so an unattended
//! soak test can be audited afterwards. Without a directory, and always for
//! `ports`, [`init_console`] writes to stderr only. Colour is used only when
//! stderr is a terminal, so redirected output stays plain text.

use std::io::IsTerminal;
use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File prefix for the daily diagnostics files.
const DIAGNOSTICS_PREFIX: &str = "starrisc-monitor.log";

/// Keeps the background diagnostics writer alive.
///
/// Hold it for the whole monitoring session; dropping it flushes whatever
/// the writer still buffers.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Trace to stderr and to `{dir}/starrisc-monitor.log.YYYY-MM-DD` as JSON.
///
/// # Errors
///
/// Returns an error if `dir` cannot be created.
pub fn init_with_dir(dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create diagnostics directory {}", dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, DIAGNOSTICS_PREFIX));

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
        .with(stderr_layer())
        .init();

    Ok(LoggingGuard { _guard: guard })
}

/// Trace to stderr only.
pub fn init_console() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer())
        .init();
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
