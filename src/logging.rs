// src/logging.rs

//! Logging setup for `phasedag` using `tracing` + `tracing-subscriber`.
//!
//! The filter is chosen as follows:
//! 1. `--log-level` CLI flag, applied to every target
//! 2. `PHASEDAG_LOG`, in `EnvFilter` directive syntax
//!    (`debug`, `phasedag::engine=trace,info`, ...)
//! 3. `info`
//!
//! Logs go to STDERR; stdout carries only command output (batch listings,
//! checkpoint tables, plan summaries).

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable consulted when no CLI level is given.
pub const LOG_ENV_VAR: &str = "PHASEDAG_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV_VAR).ok().as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

/// Filter for the given CLI level and raw `PHASEDAG_LOG` value.
///
/// An unparseable env value falls back to the default rather than failing
/// startup.
pub fn build_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(directive_for(level));
    }

    match env_value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => EnvFilter::try_new(raw).unwrap_or_else(|e| {
            eprintln!("ignoring invalid {LOG_ENV_VAR}={raw:?}: {e}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        None => EnvFilter::new(DEFAULT_DIRECTIVE),
    }
}

fn directive_for(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
