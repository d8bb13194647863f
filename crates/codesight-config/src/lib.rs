//! Configuration management system for codesight
//!
//! This crate loads the settings the sync engine runs with: the service token and
//! analysis options, the bundle protocol limits, and logging.
//!
//! # Features
//!
//! - **Multiple formats**: YAML, TOML and JSON configuration files
//! - **Validation**: Type-safe configuration with validation on build
//! - **Environment overrides**: `CODESIGHT__SECTION__KEY` variables win over files
//! - **Defaults**: Every value has a default matching the service's contract
//!
//! # Examples
//!
//! ```rust
//! use codesight_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("codesight.yaml")
//!     .add_env_prefix("CODESIGHT")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Payload limit: {}", config.sync.max_payload_bytes.get());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use codesight_types::{AttemptLimit, PayloadLimit, PollSchedule};
use serde::{Deserialize, Serialize};

pub mod builder;
pub mod error;
pub mod loader;
pub mod logging;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use logging::init_logging;

/// Main configuration structure for codesight
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Remote service options
    #[serde(default)]
    pub service: ServiceConfig,
    /// Bundle protocol limits
    #[serde(default)]
    pub sync: SyncConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote analysis service options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// API token sent with every request
    #[serde(default)]
    pub token: String,
    /// Lowest severity the service should report (1..=3)
    #[serde(default = "default_min_severity")]
    pub min_severity: u8,
    /// Ask the service to run linters as well
    #[serde(default)]
    pub use_linter: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            min_severity: default_min_severity(),
            use_linter: false,
        }
    }
}

fn default_min_severity() -> u8 {
    1
}

/// Bundle protocol limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Ceiling for one create/extend or upload request
    #[serde(default)]
    pub max_payload_bytes: PayloadLimit,
    /// Upload passes before giving up on missing files
    #[serde(default)]
    pub upload_attempts: AttemptLimit,
    /// Analysis polling budget
    #[serde(default)]
    pub poll: PollSchedule,
    /// Delay between two checks while waiting for a running update, in milliseconds
    #[serde(default = "default_wait_interval_ms")]
    pub wait_interval_ms: u64,
    /// Files larger than this are never put into a bundle
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: PayloadLimit::default(),
            upload_attempts: AttemptLimit::default(),
            poll: PollSchedule::default(),
            wait_interval_ms: default_wait_interval_ms(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_wait_interval_ms() -> u64 {
    100
}

fn default_max_file_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatting
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_service_contract() {
        let config = Config::default();
        assert_eq!(config.sync.max_payload_bytes.get(), 4_000_000);
        assert_eq!(config.sync.upload_attempts.get(), 5);
        assert_eq!(config.sync.poll.attempt_budget(), 100);
        assert_eq!(config.service.min_severity, 1);
        assert!(!config.service.use_linter);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("service:\n  token: abc\n").unwrap();
        assert_eq!(config.service.token, "abc");
        assert_eq!(config.sync, SyncConfig::default());
    }
}
