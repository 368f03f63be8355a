//! Configuration module for Sightline.
//!
//! Typed settings for backends and generation providers. Values are resolved
//! by the caller (the CLI reads them from flags and the environment) and
//! validated here before any adapter is constructed.

pub mod backend;
pub mod provider;

pub use backend::{ClickHouseConfig, GcpConfig, NewRelicConfig};
pub use provider::{GeminiConfig, OllamaConfig, ProviderConfig, VertexAiConfig};

use thiserror::Error;
use validator::{Validate, ValidationErrors};

/// Errors that can occur while validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more required settings are empty or out of range.
    #[error("Invalid configuration: missing or invalid {fields}")]
    Invalid {
        /// Comma separated names of the offending fields.
        fields: String,
        /// Underlying validation errors.
        #[source]
        source: ValidationErrors,
    },
}

impl ConfigError {
    /// Names of the offending fields.
    #[must_use]
    pub fn fields(&self) -> &str {
        match self {
            Self::Invalid { fields, .. } => fields,
        }
    }
}

impl From<ValidationErrors> for ConfigError {
    fn from(source: ValidationErrors) -> Self {
        let mut names: Vec<String> = source
            .field_errors()
            .keys()
            .map(ToString::to_string)
            .collect();
        names.sort();
        Self::Invalid {
            fields: names.join(", "),
            source,
        }
    }
}

/// Validates a configuration struct.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] naming every field that failed.
pub fn validate_config<T: Validate>(config: &T) -> Result<(), ConfigError> {
    config.validate().map_err(ConfigError::from)
}
