//! Configuration file for batch validation runs.
//!
//! # Example YAML
//!
//! ```yaml
//! version: "1.0"
//! compile:
//!   validate_formats: true
//! validation:
//!   jobs: 4
//! ```

use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use stream_schema_core::CompileOptions;
use thiserror::Error;

/// Errors raised while loading a [`CliConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be opened or read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid YAML for this configuration.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Settings for the validation worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Number of instance files validated in parallel.
    pub jobs: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { jobs: 4 }
    }
}

/// Top-level configuration for the `validate` command. Every section is
/// optional; command-line flags take precedence over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Configuration format version (e.g., `"1.0"`).
    pub version: String,
    /// Schema compilation settings.
    pub compile: CompileOptions,
    /// Instance validation settings.
    pub validation: ValidationConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            compile: CompileOptions::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        let config = serde_yaml::from_reader(BufReader::new(file))?;
        Ok(config)
    }
}
