//! # Structured Logging
//!
//! Installs the global `tracing` subscriber with a configurable format (JSON
//! or pretty-printed) and `RUST_LOG`-based filtering. Library code only emits
//! events; hosts call [`init_logging`] once at startup.
//!
//! Output goes to stderr so stdout stays free for structured data.

use serde::{Deserialize, Serialize};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output for local development.
    Pretty,
    /// JSON lines for log aggregation.
    Json,
}

impl LogFormat {
    /// Accepts "json" or "pretty" (case-insensitive); anything else is `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` overrides `config.level` when set, e.g.:
///
/// ```text
/// RUST_LOG=eco_market=debug,eco_ledger=info
/// ```
///
/// Returns an error instead of panicking if a global subscriber is already
/// installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()?,
    }

    tracing::info!(format = ?config.format, level = %config.level, "logging initialized");
    Ok(())
}
