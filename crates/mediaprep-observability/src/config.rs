//! Configuration for structured logging.
//!
//! Output format, level filter and decoration options for the subscriber
//! installed by [`crate::init_tracing_with_config`].

use std::str::FromStr;
use thiserror::Error;

/// Filter used for `--verbose`: debug everywhere, every pipeline transition
pub const VERBOSE_FILTER: &str = "debug,mediaprep_media=trace";

/// Errors that can occur during logging configuration
#[derive(Error, Debug)]
pub enum LogError {
    /// Unknown format name
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Filter directive did not parse, or a subscriber is already installed
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Output format for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Pretty-printed logs with colors and human-readable formatting
    #[default]
    Pretty,

    /// Compact single-line format
    Compact,

    /// JSON format for machine-readable logs
    Json,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(LogError::InvalidFormat(format!(
                "Unknown format: {}. Expected one of: pretty, compact, json",
                s
            ))),
        }
    }
}

/// Log output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Write to standard error
    Stderr,

    /// Write to standard output
    Stdout,
}

/// Configuration for logging
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format for logs
    pub format: LogFormat,

    /// Filter directive (e.g. "info", "mediaprep_media=debug").
    /// If None, `RUST_LOG` is used, then "info"
    pub level: Option<String>,

    /// Whether to use colored output (ignored for JSON)
    pub use_color: bool,

    /// Whether to include timestamps in output
    pub use_timestamps: bool,

    /// Whether to include target module names
    pub include_targets: bool,

    /// Output destination (stderr by default)
    pub output: LogOutput,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Pretty,
            level: None,
            use_color: true,
            use_timestamps: true,
            include_targets: true,
            output: LogOutput::Stderr,
        }
    }
}

impl LogConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the filter directive
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Enable or disable color output
    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    /// Enable or disable timestamps
    pub fn with_timestamps(mut self, use_timestamps: bool) -> Self {
        self.use_timestamps = use_timestamps;
        self
    }

    /// Enable or disable target module names
    pub fn with_targets(mut self, include_targets: bool) -> Self {
        self.include_targets = include_targets;
        self
    }

    /// Set the output destination
    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Apply command-line verbosity.
    ///
    /// `quiet` wins over `verbose`. With neither flag, `fallback` becomes the
    /// filter when given; otherwise the level is left for `RUST_LOG`.
    pub fn with_verbosity(self, verbose: bool, quiet: bool, fallback: Option<&str>) -> Self {
        if quiet {
            self.with_level("error")
        } else if verbose {
            self.with_level(VERBOSE_FILTER).with_targets(true)
        } else if let Some(level) = fallback {
            self.with_level(level)
        } else {
            self
        }
    }

    /// Get the effective filter from config or environment
    pub fn get_effective_level(&self) -> String {
        self.level
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| "info".to_string())
    }
}
