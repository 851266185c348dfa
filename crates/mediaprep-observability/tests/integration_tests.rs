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

//! Integration tests for logging setup
//!
//! The global subscriber can only be installed once per process, so a
//! single test covers installation and the rest build configurations.

use mediaprep_observability::{init_tracing_with_config, LogConfig, LogFormat, LogOutput};

#[test]
fn test_config_builder_chaining() {
    let config = LogConfig::new()
        .with_format(LogFormat::Json)
        .with_level("debug")
        .with_timestamps(false)
        .with_color(false)
        .with_targets(false)
        .with_output(LogOutput::Stdout);

    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, Some("debug".to_string()));
    assert!(!config.use_timestamps);
    assert!(!config.use_color);
    assert!(!config.include_targets);
    assert_eq!(config.output, LogOutput::Stdout);
}

#[test]
fn test_default_config() {
    let config = LogConfig::default();
    assert_eq!(config.format, LogFormat::Pretty);
    assert_eq!(config.output, LogOutput::Stderr);
    assert!(config.use_color);
    assert!(config.use_timestamps);
}

#[test]
fn test_explicit_level_overrides_env() {
    std::env::set_var("RUST_LOG", "trace");
    let config = LogConfig::new()
        .with_format(LogFormat::Compact)
        .with_level("warn");
    assert_eq!(config.get_effective_level(), "warn");
}

#[test]
fn test_second_install_is_an_error() {
    let config = LogConfig::new()
        .with_format(LogFormat::Compact)
        .with_level("error")
        .with_color(false);

    assert!(init_tracing_with_config(config.clone()).is_ok());
    assert!(init_tracing_with_config(config).is_err());
    tracing::error!("logged through the installed subscriber");
}
