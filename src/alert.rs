//! Operator alerts.
//!
//! [`AlertSink`] is the single capability the monitor calls. Implementations
//! must not fail the caller; problems are logged and swallowed.

use std::io::Write;

use tracing::{debug, warn};

use crate::config::{AlertConfig, AlertMode};

/// Renders an audible or visual cue for the operator.
pub trait AlertSink: Send + Sync {
    /// Short name of the mechanism, for diagnostics.
    fn name(&self) -> &'static str;

    /// Raise the alert. Never fails.
    fn notify(&self);
}

/// Terminal bell (`BEL`) written to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalBell;

impl AlertSink for TerminalBell {
    fn name(&self) -> &'static str {
        "bell"
    }

    fn notify(&self) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(b"\x07").and_then(|()| out.flush()) {
            warn!(error = %e, "failed to ring terminal bell");
        }
    }
}

/// Spawns an external command for each alert without waiting for it.
#[derive(Debug, Clone)]
pub struct CommandAlert {
    program: String,
    args: Vec<String>,
}

impl CommandAlert {
    /// Create from a program and its arguments.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Create from an argv list. Returns `None` for an empty list.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

impl AlertSink for CommandAlert {
    fn name(&self) -> &'static str {
        "command"
    }

    fn notify(&self) {
        // Dropped children are reaped by the tokio runtime.
        match tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
        {
            Ok(_child) => debug!(program = %self.program, "alert command spawned"),
            Err(e) => {
                warn!(program = %self.program, error = %e, "failed to spawn alert command");
            }
        }
    }
}

/// Discards alerts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAlert;

impl AlertSink for NullAlert {
    fn name(&self) -> &'static str {
        "none"
    }

    fn notify(&self) {}
}

/// The alert mechanism for the platform this binary was built for.
#[cfg(windows)]
pub fn platform_default() -> Box<dyn AlertSink> {
    Box::new(CommandAlert::new(
        "powershell",
        vec![
            "-NoProfile".to_owned(),
            "-Command".to_owned(),
            "[System.Media.SystemSounds]::Hand.Play()".to_owned(),
        ],
    ))
}

/// The alert mechanism for the platform this binary was built for.
#[cfg(not(windows))]
pub fn platform_default() -> Box<dyn AlertSink> {
    Box::new(TerminalBell)
}

/// Build the configured alert sink.
pub fn from_config(config: &AlertConfig) -> Box<dyn AlertSink> {
    match config.mode {
        AlertMode::Auto => platform_default(),
        AlertMode::Bell => Box::new(TerminalBell),
        AlertMode::Command => match CommandAlert::from_argv(&config.command) {
            Some(cmd) => Box::new(cmd),
            None => {
                warn!("alert.command is empty, falling back to platform default");
                platform_default()
            }
        },
        AlertMode::None => Box::new(NullAlert),
    }
}
