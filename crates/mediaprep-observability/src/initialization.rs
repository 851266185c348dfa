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

//! Logging initialization and setup.

use crate::config::{LogConfig, LogError, LogFormat, LogOutput};
use std::io;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Initialize tracing with the specified format and optional filter.
///
/// Without a filter, `RUST_LOG` is consulted before falling back to `info`.
pub fn init_tracing(format: LogFormat, level: Option<&str>) -> Result<(), LogError> {
    let mut config = LogConfig::new().with_format(format);
    if let Some(level) = level {
        config = config.with_level(level);
    }
    init_tracing_with_config(config)
}

/// Initialize tracing with a detailed configuration.
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init_tracing_with_config(config: LogConfig) -> Result<(), LogError> {
    let env_filter = build_env_filter(&config)?;
    let registry = Registry::default().with(env_filter);

    let result = match config.format {
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .with_writer(get_writer(config.output))
                .with_target(config.include_targets)
                .with_ansi(config.use_color)
                .with_span_events(FmtSpan::CLOSE)
                .pretty();

            if config.use_timestamps {
                registry.with(layer).try_init()
            } else {
                registry.with(layer.without_time()).try_init()
            }
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .with_writer(get_writer(config.output))
                .with_target(config.include_targets)
                .with_ansi(config.use_color)
                .with_span_events(FmtSpan::CLOSE)
                .compact();

            if config.use_timestamps {
                registry.with(layer).try_init()
            } else {
                registry.with(layer.without_time()).try_init()
            }
        }
        LogFormat::Json => {
            let layer = fmt::layer()
                .with_writer(get_writer(config.output))
                .json()
                .with_target(config.include_targets)
                .with_current_span(true)
                .with_span_events(FmtSpan::CLOSE);

            if config.use_timestamps {
                registry.with(layer).try_init()
            } else {
                registry.with(layer.without_time()).try_init()
            }
        }
    };

    result.map_err(|e| LogError::ConfigError(format!("Failed to install subscriber: {}", e)))
}

/// Get the writer for the specified output
fn get_writer(output: LogOutput) -> fn() -> Box<dyn io::Write + Send> {
    match output {
        LogOutput::Stderr => || Box::new(io::stderr()),
        LogOutput::Stdout => || Box::new(io::stdout()),
    }
}

/// Build an environment filter for the given configuration
fn build_env_filter(config: &LogConfig) -> Result<EnvFilter, LogError> {
    let level_str = config.get_effective_level();

    EnvFilter::try_new(&level_str).map_err(|e| {
        LogError::ConfigError(format!("Failed to parse log filter '{}': {}", level_str, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Installing the global subscriber is covered once, in the integration tests.

    #[test]
    fn test_env_filter_parsing() {
        let result = build_env_filter(&LogConfig::new().with_level("debug"));
        assert!(result.is_ok());
    }

    #[test]
    fn test_per_crate_directive() {
        let result = build_env_filter(&LogConfig::new().with_level("warn,mediaprep_media=trace"));
        assert!(result.is_ok());
    }

    #[test]
    fn test_bad_directive_rejected() {
        let result = build_env_filter(&LogConfig::new().with_level("mediaprep_media=[loud"));
        assert!(matches!(result, Err(LogError::ConfigError(_))));
    }
}
