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

use anyhow::{Context, Result};
use clap::Parser;
use mediaprep_config::{Config, ConfigFormat, ConfigLoader};

/// Print the effective configuration
#[derive(Parser, Debug)]
pub struct ConfigCmd {
    /// Output format (toml, yaml, json)
    #[arg(long, value_name = "FORMAT", default_value = "toml")]
    pub format: String,
}

impl ConfigCmd {
    /// Render `config` after file and environment overrides were applied
    pub fn execute(&self, config: &Config) -> Result<()> {
        let format: ConfigFormat = self
            .format
            .parse()
            .with_context(|| format!("cannot render configuration as '{}'", self.format))?;
        let rendered = ConfigLoader::render(config, format)?;
        print!("{}", rendered);
        if !rendered.ends_with('\n') {
            println!();
        }
        Ok(())
    }
}
