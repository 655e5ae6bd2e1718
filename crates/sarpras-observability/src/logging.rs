//! Logging bootstrap.
//!
//! The core crate only emits `tracing` events and `#[instrument]` spans;
//! whatever binary hosts it calls [`init`] once at startup to install the
//! subscriber. `RUST_LOG` always wins over the built-in directives, so an
//! operator can turn a single module up to `trace` without a redeploy.

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact human-readable lines for terminals.
    Text,
    /// One JSON object per line for log shippers.
    Json,
}

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level applied to the workspace crates when `RUST_LOG` is unset.
    pub level: Level,
    pub format: LogFormat,
    /// Emit span open/close events. Spans wrap the cache producers and
    /// repository transactions, so this doubles as cheap timing.
    pub span_lifecycle: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
            span_lifecycle: false,
        }
    }
}

impl LoggingConfig {
    /// Verbose terminal output for local development.
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Text,
            span_lifecycle: true,
        }
    }

    /// JSON output for deployed instances.
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Json,
            span_lifecycle: false,
        }
    }

    /// The directive string used when `RUST_LOG` is unset: workspace
    /// crates at the configured level, everything else capped at `warn`.
    pub fn default_directives(&self) -> String {
        let level = self.level.to_string().to_lowercase();
        format!("warn,sarpras_core={level},sarpras_observability={level}")
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_lifecycle {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Installs the global subscriber with the default configuration.
pub fn init() -> Result<(), TryInitError> {
    init_with_config(&LoggingConfig::default())
}

/// Installs the global subscriber.
///
/// Errors if a subscriber is already installed, so a host that
/// initializes logging twice fails loudly instead of silently keeping
/// the first configuration.
pub fn init_with_config(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directives()));
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_span_events(config.span_events()),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_span_events(config.span_events()),
            )
            .try_init(),
    }
}
