//! MediaPrep Observability Module
//!
//! Structured logging for the MediaPrep crates and the `mediaprep` binary.
//!
//! # Features
//!
//! - **Multiple Output Formats**: Pretty, JSON, and compact output formats
//! - **Environment-based Filtering**: `RUST_LOG` when no level is configured
//! - **Structured Logging**: JSON output for machine-readable logs
//!
//! # Example
//!
//! ```ignore
//! use mediaprep_observability::{init_tracing, LogFormat};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_tracing(LogFormat::Compact, Some("mediaprep_media=debug"))?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod initialization;

pub use config::{LogConfig, LogError, LogFormat, LogOutput, VERBOSE_FILTER};
pub use initialization::{init_tracing, init_tracing_with_config};

/// Tracing re-exports for convenience
pub use tracing::{debug, error, info, trace, warn, Level};
