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

use crate::error::{ConfigError, ConfigResult};
use crate::schema::Config;
use crate::validation::Validator;
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::{debug, info};

/// Prefix shared by every environment override
pub const ENV_PREFIX: &str = "MEDIAPREP_";

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.toml`
    Toml,
    /// `.yaml` / `.yml`
    Yaml,
    /// `.json`
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::InvalidPath(path.to_path_buf())),
        }
    }

    /// Get format name as string
    pub fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Yaml => "YAML",
            ConfigFormat::Json => "JSON",
        }
    }
}

impl FromStr for ConfigFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "toml" => Ok(ConfigFormat::Toml),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "json" => Ok(ConfigFormat::Json),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Configuration loader
#[derive(Debug)]
pub struct ConfigLoader {
    validate: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        ConfigLoader { validate: true }
    }

    /// Create a loader without validation
    pub fn without_validation() -> Self {
        ConfigLoader { validate: false }
    }

    /// Load configuration from a file
    pub async fn load_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<Config> {
        let path = path.as_ref();
        debug!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path).await?;

        info!(
            "Loaded {} configuration file: {}",
            format.name(),
            path.display()
        );

        self.load_from_string(&content, format)
    }

    /// Load configuration from a string
    pub fn load_from_string(&self, content: &str, format: ConfigFormat) -> ConfigResult<Config> {
        let config: Config = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };

        debug!("Configuration loaded from {}", format.name());
        self.finish(config)
    }

    /// Load a file, then apply `MEDIAPREP_*` environment overrides.
    ///
    /// Without a path the defaults are used as the base.
    pub async fn load_with_overrides<P: AsRef<Path>>(
        &self,
        path: Option<P>,
    ) -> ConfigResult<Config> {
        let mut config = match path {
            Some(path) => Self::without_validation().load_file(path).await?,
            None => Config::default(),
        };
        self.apply_env_overrides(&mut config)?;
        self.finish(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&self, config: &mut Config) -> ConfigResult<()> {
        self.apply_overrides_from(config, |name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup`, keyed by full variable name
    pub fn apply_overrides_from<F>(&self, config: &mut Config, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let name = format!("{}{}", ENV_PREFIX, suffix);
            lookup(&name).map(|value| (name, value))
        };

        // Image settings
        if let Some((name, value)) = var("IMAGE_MAX_SIZE_MB") {
            config.image.max_size_mb = parse(&name, &value, "expected a number of megabytes")?;
        }
        if let Some((name, value)) = var("IMAGE_QUALITY") {
            config.image.quality = parse(&name, &value, "expected a quality in (0, 1]")?;
        }
        if let Some((name, value)) = var("IMAGE_MAX_WIDTH") {
            config.image.max_width = parse(&name, &value, "expected a pixel count")?;
        }
        if let Some((name, value)) = var("IMAGE_MAX_HEIGHT") {
            config.image.max_height = parse(&name, &value, "expected a pixel count")?;
        }

        // Video settings
        if let Some((name, value)) = var("VIDEO_MAX_SIZE_MB") {
            config.video.max_size_mb = parse(&name, &value, "expected a number of megabytes")?;
        }
        if let Some((name, value)) = var("VIDEO_TARGET_BITRATE") {
            config.video.target_bitrate = parse(&name, &value, "expected bits per second")?;
        }
        if let Some((name, value)) = var("VIDEO_MAX_RECORDING_TIME_MS") {
            config.video.max_recording_time_ms = parse(&name, &value, "expected milliseconds")?;
        }
        if let Some((name, value)) = var("VIDEO_LOAD_TIMEOUT_MS") {
            config.video.load_timeout_ms = parse(&name, &value, "expected milliseconds")?;
        }

        // Converter settings
        if let Some((name, value)) = var("CONVERTER_CEILING_MB") {
            config.converter.ceiling_mb = parse(&name, &value, "expected a number of megabytes")?;
        }
        if let Some((name, value)) = var("CONVERTER_BITRATE") {
            config.converter.bitrate = parse(&name, &value, "expected bits per second")?;
        }

        // Observability settings
        if let Some((_, value)) = var("LOG_LEVEL") {
            config.observability.log_level = value;
        }
        if let Some((_, value)) = var("LOG_FORMAT") {
            config.observability.log_format = value;
        }

        Ok(())
    }

    /// Render `config` in `format`
    pub fn render(config: &Config, format: ConfigFormat) -> ConfigResult<String> {
        match format {
            ConfigFormat::Toml => toml::to_string_pretty(config)
                .map_err(|e| ConfigError::SerializationError(e.to_string())),
            ConfigFormat::Yaml => serde_yaml::to_string(config)
                .map_err(|e| ConfigError::SerializationError(e.to_string())),
            ConfigFormat::Json => serde_json::to_string_pretty(config)
                .map_err(|e| ConfigError::SerializationError(e.to_string())),
        }
    }

    fn finish(&self, config: Config) -> ConfigResult<Config> {
        if self.validate {
            config.validate()?;
            info!("Configuration validated successfully");
        }
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse<T: FromStr>(name: &str, value: &str, reason: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_var_parsing_error(name, value, reason))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ConfigFormat::from_path("config.toml").unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path("config.yaml").unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path("config.yml").unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path("config.json").unwrap(), ConfigFormat::Json);
    }

    #[test]
    fn test_format_detection_error() {
        assert!(ConfigFormat::from_path("config.xml").is_err());
        assert!(ConfigFormat::from_path("config").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let loader = ConfigLoader::new();
        let mut config = Config::default();
        loader
            .apply_overrides_from(
                &mut config,
                lookup(&[
                    ("MEDIAPREP_IMAGE_MAX_SIZE_MB", "2.5"),
                    ("MEDIAPREP_VIDEO_LOAD_TIMEOUT_MS", " 5000 "),
                    ("MEDIAPREP_LOG_FORMAT", "json"),
                ]),
            )
            .unwrap();

        assert_eq!(config.image.max_size_mb, 2.5);
        assert_eq!(config.video.load_timeout_ms, 5000);
        assert_eq!(config.observability.log_format, "json");
        assert_eq!(config.video.max_size_mb, 50.0);
    }

    #[test]
    fn test_bad_env_override_names_variable() {
        let loader = ConfigLoader::new();
        let mut config = Config::default();
        let err = loader
            .apply_overrides_from(&mut config, lookup(&[("MEDIAPREP_VIDEO_TARGET_BITRATE", "fast")]))
            .unwrap_err();
        assert!(err.to_string().contains("MEDIAPREP_VIDEO_TARGET_BITRATE=fast"));
    }

    #[test]
    fn test_render_parses_back() {
        let config = Config::default();
        for format in [ConfigFormat::Toml, ConfigFormat::Yaml, ConfigFormat::Json] {
            let text = ConfigLoader::render(&config, format).unwrap();
            let parsed = ConfigLoader::new().load_from_string(&text, format).unwrap();
            assert_eq!(parsed, config, "{} did not survive", format.name());
        }
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let json = r#"{"image": {"quality": 1.5}}"#;
        assert!(ConfigLoader::new()
            .load_from_string(json, ConfigFormat::Json)
            .is_err());
        assert!(ConfigLoader::without_validation()
            .load_from_string(json, ConfigFormat::Json)
            .is_ok());
    }
}
