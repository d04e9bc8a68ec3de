//! Logging subscriber setup
//!
//! Builds a layered `tracing-subscriber` registry:
//!
//! ```text
//! Registry
//!   ├── EnvFilter (RUST_LOG, falling back to the configured level)
//!   └── Fmt Layer (pretty or JSON)
//! ```

use crate::config::LoggingConfig;
use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Telemetry errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{0}': {1}")]
    InvalidFilter(String, String),

    #[error("Failed to set global subscriber (may already be initialized): {0}")]
    AlreadyInitialized(String),
}

/// Resolve the filter: RUST_LOG wins, then `level_override`, then the config.
pub fn env_filter(
    config: &LoggingConfig,
    level_override: Option<&str>,
) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directive = level_override.unwrap_or(config.level.as_str());
    EnvFilter::try_new(directive)
        .map_err(|e| TelemetryError::InvalidFilter(directive.to_string(), e.to_string()))
}

/// Subscriber type shared by both output formats
pub type BoxedSubscriber = Box<dyn Subscriber + Send + Sync + 'static>;

/// Build the layered subscriber without installing it.
///
/// Logs go to stderr so that stdout stays machine-readable.
pub fn build_subscriber(
    config: &LoggingConfig,
    level_override: Option<&str>,
) -> Result<BoxedSubscriber, TelemetryError> {
    let filter = env_filter(config, level_override)?;
    let registry = tracing_subscriber::registry().with(filter);

    let subscriber: BoxedSubscriber = if config.format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr);
        Box::new(registry.with(fmt_layer))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_writer(std::io::stderr);
        Box::new(registry.with(fmt_layer))
    };
    Ok(subscriber)
}

/// Install the global subscriber.
pub fn init_subscriber(
    config: &LoggingConfig,
    level_override: Option<&str>,
) -> Result<(), TelemetryError> {
    let subscriber = build_subscriber(config, level_override)?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))
}
