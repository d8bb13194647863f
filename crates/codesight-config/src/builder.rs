//! Configuration builder for flexible configuration loading

use crate::{Config, ConfigError, ConfigResult};
use config::{ConfigBuilder as ConfigBuilderInner, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

/// Configuration builder for loading configuration from multiple sources
#[derive(Debug)]
pub struct ConfigBuilder {
    inner: ConfigBuilderInner<config::builder::DefaultState>,
    sources: Vec<ConfigSource>,
    env_separator: String,
}

#[derive(Debug, Clone)]
enum ConfigSource {
    File { path: PathBuf, format: FileFormat },
    Defaults,
    Environment { prefix: String },
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            inner: config::Config::builder(),
            sources: Vec::new(),
            env_separator: "__".to_string(),
        }
    }

    /// Add default configuration values
    pub fn add_defaults(mut self) -> Self {
        self.sources.push(ConfigSource::Defaults);
        self
    }

    /// Add a configuration file source; missing files are skipped
    pub fn add_source_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = Self::detect_format(&path);
        self.sources.push(ConfigSource::File { path, format });
        self
    }

    /// Add environment variable source with prefix
    pub fn add_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.sources.push(ConfigSource::Environment {
            prefix: prefix.into(),
        });
        self
    }

    /// Set environment variable separator (default: "__")
    pub fn env_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.env_separator = separator.into();
        self
    }

    /// Build the configuration
    pub fn build(mut self) -> ConfigResult<Config> {
        // Defaults are always the base layer
        let defaults_value = serde_yaml::to_value(Config::default())
            .map_err(|e| ConfigError::other(format!("Failed to serialize defaults: {}", e)))?;
        self.inner = self
            .inner
            .add_source(config::Config::try_from(&defaults_value)?);

        for source in &self.sources {
            match source {
                ConfigSource::File { path, format } => {
                    if path.exists() {
                        self.inner = self
                            .inner
                            .add_source(File::from(path.clone()).format(*format));
                    }
                }
                ConfigSource::Environment { prefix } => {
                    self.inner = self.inner.add_source(
                        Environment::with_prefix(prefix)
                            .separator(&self.env_separator)
                            .try_parsing(true),
                    );
                }
                ConfigSource::Defaults => {}
            }
        }

        let config = self.inner.build()?;
        let result: Config = config.try_deserialize()?;

        Self::validate(&result)?;

        Ok(result)
    }

    /// Try to build the configuration, returning defaults on error
    pub fn build_or_default(self) -> Config {
        self.build().unwrap_or_default()
    }

    /// Detect file format from extension
    fn detect_format(path: &Path) -> FileFormat {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("toml") => FileFormat::Toml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Yaml,
        }
    }

    /// Validate the configuration
    pub(crate) fn validate(config: &Config) -> ConfigResult<()> {
        if !(1..=3).contains(&config.service.min_severity) {
            return Err(ConfigError::validation(
                "Minimum severity must be between 1 and 3",
            ));
        }

        config
            .sync
            .poll
            .validate()
            .map_err(ConfigError::validation)?;

        if config.sync.wait_interval_ms == 0 {
            return Err(ConfigError::validation(
                "Wait interval must be greater than 0",
            ));
        }

        if config.sync.max_file_size == 0 {
            return Err(ConfigError::validation(
                "Maximum file size must be greater than 0",
            ));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&config.logging.level.as_str()) {
            return Err(ConfigError::validation(
                "Log level must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn yaml_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_builder_defaults() {
        let config = ConfigBuilder::new().add_defaults().build().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_builder_yaml_file() {
        let file = yaml_file(
            r#"
service:
  token: secret
  min_severity: 2
sync:
  upload_attempts: 3
  poll:
    timeout_ms: 2000
    interval_ms: 100
"#,
        );

        let config = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(file.path())
            .build()
            .unwrap();

        assert_eq!(config.service.token, "secret");
        assert_eq!(config.service.min_severity, 2);
        assert_eq!(config.sync.upload_attempts.get(), 3);
        assert_eq!(config.sync.poll.attempt_budget(), 20);
        assert_eq!(config.sync.max_payload_bytes.get(), 4_000_000);
    }

    #[test]
    fn test_builder_rejects_bad_severity() {
        let file = yaml_file("service:\n  min_severity: 7\n");

        let result = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(file.path())
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Minimum severity must be between 1 and 3"));
    }

    #[test]
    fn test_builder_rejects_interval_longer_than_timeout() {
        let file = yaml_file("sync:\n  poll:\n    timeout_ms: 100\n    interval_ms: 500\n");

        let result = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(file.path())
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let config = ConfigBuilder::new()
            .add_defaults()
            .add_source_file("/definitely/not/here/codesight.toml")
            .build()
            .unwrap();
        assert_eq!(config, Config::default());
    }
}
