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

// Command modules for the mediaprep CLI
pub mod config;
pub mod image;
pub mod plan;

pub use config::ConfigCmd;
pub use image::ImageCmd;
pub use plan::PlanCmd;
