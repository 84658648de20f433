//! Logging configuration for the receiver
//!
//! Structured logging via `tracing`. JSON lines on stdout are the default so
//! log collectors can ingest them directly; the compact format is meant for
//! running the receiver in a terminal.

use crate::Result;
use std::str::FromStr;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use zone_receiver_core::Error;

/// Crates whose events are enabled by the configured level
const LOG_TARGETS: &[&str] = &[
    "zone_receiver",
    "zone_receiver_config",
    "zone_receiver_core",
    "zone_receiver_engine",
];

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Everything, including per-chunk tracing
    Trace,
    /// Debug diagnostics
    Debug,
    /// Normal operation
    #[default]
    Info,
    /// Recoverable problems
    Warn,
    /// Failures
    Error,
}

impl LogLevel {
    /// Parse a level name case-insensitively, falling back to `Info`
    ///
    /// # Examples
    /// ```
    /// use zone_receiver_config::LogLevel;
    ///
    /// assert_eq!(LogLevel::parse("DEBUG"), LogLevel::Debug);
    /// assert_eq!(LogLevel::parse("WARN"), LogLevel::Warn);
    /// assert_eq!(LogLevel::parse("nonsense"), LogLevel::Info);
    /// ```
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }

    /// Directive name understood by `EnvFilter`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable single-line output
    Compact,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "compact" | "text" => Ok(Self::Compact),
            other => Err(Error::Config(format!(
                "Unknown log format '{other}' (expected 'json' or 'compact')"
            ))),
        }
    }
}

/// Build the default filter directive for a level
///
/// Only this workspace's crates are enabled; dependencies stay silent unless
/// `RUST_LOG` asks for them.
fn default_directive(level: LogLevel) -> String {
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize the logging system
///
/// `RUST_LOG` overrides `level` when set.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
///
/// # Examples
/// ```ignore
/// init(LogLevel::Info, LogFormat::Json)?;
/// ```
pub fn init(level: LogLevel, format: LogFormat) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive(level))
            .map_err(|e| Error::Config(format!("Invalid log filter: {e}")))?,
    };

    let stdout_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_ansi(true)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to install log subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_log_level_parse_is_case_insensitive() {
        assert_eq!(LogLevel::parse("Trace"), LogLevel::Trace);
        assert_eq!(LogLevel::parse(" error "), LogLevel::Error);
        assert_eq!(LogLevel::parse("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::parse(""), LogLevel::Info);
    }

    #[test]
    fn test_log_level_accepts_only_canonical_names() {
        assert_eq!(LogLevel::parse("warn"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("warning"), LogLevel::Info);
        assert_eq!(LogLevel::parse("err"), LogLevel::Info);
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_default_directive_covers_workspace_crates() {
        let directive = default_directive(LogLevel::Warn);
        assert_eq!(
            directive,
            "zone_receiver=warn,zone_receiver_config=warn,zone_receiver_core=warn,zone_receiver_engine=warn"
        );
        assert!(EnvFilter::try_new(directive).is_ok());
    }
}
