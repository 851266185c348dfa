// MediaPrep - Client-side media preprocessing
// Copyright (C) 2025 MediaPrep Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.

//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading the configuration file failed
    #[error("IO error reading configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML did not parse
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),

    /// YAML did not parse
    #[error("Failed to parse YAML configuration: {0}")]
    YamlParseError(#[from] serde_yaml::Error),

    /// JSON did not parse
    #[error("Failed to parse JSON configuration: {0}")]
    JsonParseError(#[from] serde_json::Error),

    /// Rendering the configuration failed
    #[error("Failed to serialize configuration: {0}")]
    SerializationError(String),

    /// Cross-field validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// File extension is not toml, yaml, yml or json
    #[error("Unsupported configuration format: {0}. Supported formats: toml, yaml, json")]
    UnsupportedFormat(String),

    /// No file at the given path
    #[error("Configuration file not found at path: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Path has no extension to pick a format from
    #[error("Invalid configuration path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// A `MEDIAPREP_*` variable could not be parsed
    #[error("Environment variable parsing error: {variable_name}={value}. {reason}")]
    EnvVarParsingError {
        /// Variable name
        variable_name: String,
        /// Raw value
        value: String,
        /// What was expected
        reason: String,
    },

    /// A field holds an out-of-range value
    #[error("Invalid configuration value for field '{field}': {reason}")]
    InvalidValue {
        /// Dotted field path, e.g. `image.quality`
        field: String,
        /// What was expected
        reason: String,
    },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::ValidationError`]
    pub fn validation_error(message: impl Into<String>) -> Self {
        ConfigError::ValidationError(message.into())
    }

    /// Shorthand for [`ConfigError::EnvVarParsingError`]
    pub fn env_var_parsing_error(
        variable_name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::EnvVarParsingError {
            variable_name: variable_name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ConfigError::InvalidValue`]
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
