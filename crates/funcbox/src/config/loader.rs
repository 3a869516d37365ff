//! Configuration file loading for funcbox
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError, ENV_PREFIX, EXAMPLE_CONFIG};
use crate::runtime::Runtime;

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load layered configuration.
    ///
    /// Layers, lowest priority first: the embedded defaults, the optional
    /// file at `path`, then `FUNCBOX_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_layers(path, Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    fn load_layers(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder()
            .add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml));
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        let config: Config = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "default_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "max_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.default_timeout_ms > self.max_timeout_ms {
            return Err(ConfigError::Invalid(format!(
                "default_timeout_ms ({}) exceeds max_timeout_ms ({})",
                self.default_timeout_ms, self.max_timeout_ms
            )));
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent must be greater than zero".to_string(),
            ));
        }

        for (id, interpreter) in &self.interpreters {
            if !Runtime::ALL.iter().any(|runtime| runtime.id() == id) {
                return Err(ConfigError::Invalid(format!(
                    "unknown runtime '{id}' in interpreters"
                )));
            }
            if interpreter
                .command
                .first()
                .is_none_or(|program| program.trim().is_empty())
            {
                return Err(ConfigError::Invalid(format!(
                    "interpreter for '{id}' has empty command"
                )));
            }
        }

        Ok(())
    }
}
