//! Tracing setup for applications embedding the fits.
//!
//! The fits themselves only emit `tracing` events and spans; nothing in the
//! library installs a subscriber. A service or test harness that wants the
//! per-fit log lines calls [`init_from_settings`] (or [`init`]) once.
//! `RUST_LOG` overrides the configured level when it is set.
//!
//! # Example
//! ```no_run
//! use resonance_fit::logging::{self, LoggingConfig, OutputFormat};
//! use tracing::Level;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! logging::init(LoggingConfig::new(Level::DEBUG, OutputFormat::Json))?;
//! # Ok(())
//! # }
//! ```

use crate::config::FitSettings;
use crate::error::{FitError, FitResult};
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Output format for fit log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Multi-line, colored; for interactive sessions
    Pretty,
    /// One line per event, no colors
    Compact,
    /// One JSON object per event
    Json,
}

/// Level and format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: Level,
    /// Output format
    pub format: OutputFormat,
}

impl LoggingConfig {
    /// Config with an explicit level and format
    #[must_use]
    pub fn new(level: Level, format: OutputFormat) -> Self {
        Self { level, format }
    }

    /// Config from the `[logging]` section of the fit settings
    pub fn from_settings(settings: &FitSettings) -> FitResult<Self> {
        Ok(Self::new(
            parse_log_level(&settings.logging.level)?,
            settings.logging.format,
        ))
    }
}

/// Installs a subscriber from the `[logging]` section of `settings`.
pub fn init_from_settings(settings: &FitSettings) -> FitResult<()> {
    init(LoggingConfig::from_settings(settings)?)
}

/// Installs a global subscriber.
///
/// Does nothing when a global subscriber is already in place, so embedding
/// services and test harnesses may both call it.
pub fn init(config: LoggingConfig) -> FitResult<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));
    let layer = match config.format {
        OutputFormat::Pretty => fmt::layer().pretty().boxed(),
        OutputFormat::Compact => fmt::layer().compact().with_ansi(false).boxed(),
        OutputFormat::Json => fmt::layer().json().boxed(),
    };
    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| FitError::Configuration(format!("failed to install subscriber: {e}")))
}

fn parse_log_level(level: &str) -> FitResult<Level> {
    level.parse::<Level>().map_err(|_| {
        FitError::Configuration(format!(
            "invalid log level '{level}', expected trace, debug, info, warn or error"
        ))
    })
}
