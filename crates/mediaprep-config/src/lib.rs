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

//! Configuration management for MediaPrep
//!
//! Settings for the image compressor, the video compressor, the format
//! converter and logging, loaded from TOML, YAML or JSON and overridden
//! from `MEDIAPREP_*` environment variables.
//!
//! # Example
//!
//! ```no_run
//! use mediaprep_config::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new()
//!         .load_with_overrides(Some("mediaprep.toml"))
//!         .await?;
//!
//!     let image = config.image.to_compression_config();
//!     println!("image budget: {} bytes", image.max_size_bytes);
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

// Re-export commonly used items
pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigFormat, ConfigLoader, ENV_PREFIX};
pub use schema::*;
pub use validation::Validator;
