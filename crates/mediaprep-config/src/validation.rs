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
use crate::schema::*;

/// Log levels accepted by `observability.log_level`
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Formats accepted by `observability.log_format`
pub const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Validator for configuration settings
pub trait Validator {
    /// Check every field, failing on the first invalid one
    fn validate(&self) -> ConfigResult<()>;
}

impl Validator for Config {
    fn validate(&self) -> ConfigResult<()> {
        self.image.validate()?;
        self.video.validate()?;
        self.converter.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

impl Validator for ImageSettings {
    fn validate(&self) -> ConfigResult<()> {
        positive_mb("image.max_size_mb", self.max_size_mb)?;

        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(ConfigError::invalid_value(
                "image.quality",
                format!("must be in (0, 1], got {}", self.quality),
            ));
        }

        dimensions("image", self.max_width, self.max_height)
    }
}

impl Validator for VideoSettings {
    fn validate(&self) -> ConfigResult<()> {
        positive_mb("video.max_size_mb", self.max_size_mb)?;
        non_zero("video.target_bitrate", self.target_bitrate)?;
        non_zero("video.max_recording_time_ms", self.max_recording_time_ms)?;
        non_zero("video.load_timeout_ms", self.load_timeout_ms)?;
        dimensions("video", self.max_width, self.max_height)
    }
}

impl Validator for ConverterSettings {
    fn validate(&self) -> ConfigResult<()> {
        positive_mb("converter.ceiling_mb", self.ceiling_mb)?;
        non_zero("converter.bitrate", self.bitrate)?;
        non_zero("converter.max_recording_time_ms", self.max_recording_time_ms)
    }
}

impl Validator for ObservabilityConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                "observability.log_level",
                format!("must be one of: {}", LOG_LEVELS.join(", ")),
            ));
        }

        if !LOG_FORMATS.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                "observability.log_format",
                format!("must be one of: {}", LOG_FORMATS.join(", ")),
            ));
        }

        Ok(())
    }
}

fn positive_mb(field: &str, mb: f64) -> ConfigResult<()> {
    if !mb.is_finite() || mb <= 0.0 {
        return Err(ConfigError::invalid_value(
            field,
            format!("must be greater than zero, got {}", mb),
        ));
    }
    Ok(())
}

fn non_zero(field: &str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::invalid_value(field, "must be greater than zero"));
    }
    Ok(())
}

fn dimensions(section: &str, width: u32, height: u32) -> ConfigResult<()> {
    if width == 0 || height == 0 {
        return Err(ConfigError::invalid_value(
            format!("{}.max_width/max_height", section),
            format!("bounding box must be non-empty, got {}x{}", width, height),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let mut config = Config::default();
        config.image.max_size_mb = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.video.max_size_mb = -5.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.converter.ceiling_mb = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_quality_bounds() {
        let mut image = ImageSettings {
            quality: 1.0,
            ..ImageSettings::default()
        };
        assert!(image.validate().is_ok());
        image.quality = 0.0;
        assert!(image.validate().is_err());
        image.quality = 1.2;
        assert!(image.validate().is_err());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let video = VideoSettings {
            load_timeout_ms: 0,
            ..VideoSettings::default()
        };
        assert!(video.validate().is_err());

        let video = VideoSettings {
            max_recording_time_ms: 0,
            ..VideoSettings::default()
        };
        assert!(video.validate().is_err());
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let video = VideoSettings {
            max_height: 0,
            ..VideoSettings::default()
        };
        assert!(matches!(
            video.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_invalid_log_settings() {
        let mut config = Config::default();
        config.observability.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.observability.log_format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.observability.log_level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }
}
