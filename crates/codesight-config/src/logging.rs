//! Tracing subscriber setup

use crate::{ConfigError, ConfigResult, LoggingConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over the configured level. A subscriber that is
/// already installed is left in place.
pub fn init_logging(config: &LoggingConfig) -> ConfigResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let installed = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = installed {
        tracing::debug!("Tracing subscriber already installed: {}", e);
    }

    Ok(())
}
