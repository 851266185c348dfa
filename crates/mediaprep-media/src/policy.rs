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

//! Bitrate and resolution policy for video attempts
//!
//! | source size | initial bitrate | initial scale | retry scale |
//! |---|---|---|---|
//! | > 100MB | 500,000 | 0.5× | 0.25× |
//! | > 75MB | 800,000 | 1× | 0.75× |
//! | over budget | base × budget / size, clamped to [500k, base] | 1× | 0.5× |
//!
//! The retry always halves the bitrate. Sources within budget never reach
//! the policy; the size gate returns them unchanged.

use crate::config::{CompressionConfig, BYTES_PER_MB};
use serde::Serialize;
use std::fmt;

/// Sources above this get the most aggressive plan
pub const HUGE_SOURCE_BYTES: u64 = 100 * BYTES_PER_MB;
/// Sources above this get a fixed reduced bitrate
pub const LARGE_SOURCE_BYTES: u64 = 75 * BYTES_PER_MB;

const HUGE_BITRATE_BPS: u64 = 500_000;
const LARGE_BITRATE_BPS: u64 = 800_000;
const PROPORTIONAL_FLOOR_BPS: u64 = 500_000;

/// Size band a source falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeBand {
    /// Above 100MB
    Huge,
    /// Above 75MB
    Large,
    /// Above budget, at most 75MB
    OverBudget,
}

impl fmt::Display for SizeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeBand::Huge => f.write_str(">100MB"),
            SizeBand::Large => f.write_str(">75MB"),
            SizeBand::OverBudget => f.write_str("over budget"),
        }
    }
}

/// Bitrate and resolution scale for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EncodePlan {
    /// Video bitrate
    pub bitrate_bps: u64,
    /// Scale applied to source dimensions
    pub scale: f64,
}

/// Plans for the initial attempt and its single retry
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VideoPlan {
    /// Band that selected the plan
    pub band: SizeBand,
    /// First attempt
    pub initial: EncodePlan,
    /// Backoff attempt, used only if the first output is still over budget
    pub retry: EncodePlan,
}

impl VideoPlan {
    /// Plan for an attempt at `retry_depth`
    pub fn at_depth(&self, retry_depth: u8) -> EncodePlan {
        if retry_depth == 0 {
            self.initial
        } else {
            self.retry
        }
    }
}

/// Choose the plan for a source of `source_bytes`, largest band first
pub fn plan_for(source_bytes: u64, config: &CompressionConfig) -> VideoPlan {
    let base = config.target_bitrate_bps.max(1);

    let (band, initial, retry_scale) = if source_bytes > HUGE_SOURCE_BYTES {
        let plan = EncodePlan {
            bitrate_bps: HUGE_BITRATE_BPS.min(base),
            scale: 0.5,
        };
        (SizeBand::Huge, plan, 0.25)
    } else if source_bytes > LARGE_SOURCE_BYTES {
        let plan = EncodePlan {
            bitrate_bps: LARGE_BITRATE_BPS.min(base),
            scale: 1.0,
        };
        (SizeBand::Large, plan, 0.75)
    } else {
        let plan = EncodePlan {
            bitrate_bps: proportional_bitrate(source_bytes, config.max_size_bytes, base),
            scale: 1.0,
        };
        (SizeBand::OverBudget, plan, 0.5)
    };

    VideoPlan {
        band,
        initial,
        retry: EncodePlan {
            bitrate_bps: (initial.bitrate_bps / 2).max(1),
            scale: retry_scale,
        },
    }
}

fn proportional_bitrate(source_bytes: u64, max_size_bytes: u64, base: u64) -> u64 {
    if source_bytes == 0 {
        return base;
    }
    let ratio = max_size_bytes as f64 / source_bytes as f64;
    let scaled = (base as f64 * ratio).round() as u64;
    scaled.clamp(PROPORTIONAL_FLOOR_BPS.min(base), base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mb(n: u64) -> u64 {
        n * BYTES_PER_MB
    }

    #[test]
    fn huge_source_starts_at_half_resolution() {
        let plan = plan_for(mb(120), &CompressionConfig::video_defaults());
        assert_eq!(plan.band, SizeBand::Huge);
        assert_eq!(plan.initial.bitrate_bps, 500_000);
        assert_eq!(plan.initial.scale, 0.5);
        assert_eq!(plan.retry.bitrate_bps, 250_000);
    }

    #[test]
    fn large_source_reduces_resolution_only_on_retry() {
        let plan = plan_for(mb(80), &CompressionConfig::video_defaults());
        assert_eq!(plan.band, SizeBand::Large);
        assert_eq!(plan.initial.scale, 1.0);
        assert_eq!(plan.retry.scale, 0.75);
        assert_eq!(plan.initial.bitrate_bps, 800_000);
    }

    #[test]
    fn proportional_band() {
        let config = CompressionConfig::video_defaults();
        let plan = plan_for(mb(60), &config);
        assert_eq!(plan.band, SizeBand::OverBudget);
        // 1Mbps * 50/60
        assert_eq!(plan.initial.bitrate_bps, 833_333);

        let barely_over = plan_for(mb(50) + 1, &config);
        assert!(barely_over.initial.bitrate_bps <= 1_000_000);
        assert!(barely_over.initial.bitrate_bps > 999_000);
    }

    #[test]
    fn low_configured_base_never_panics() {
        let config = CompressionConfig::video_defaults().with_target_bitrate(200_000);
        let plan = plan_for(mb(70), &config);
        assert_eq!(plan.initial.bitrate_bps, 200_000);
        assert_eq!(plan_for(mb(90), &config).initial.bitrate_bps, 200_000);
    }

    proptest! {
        #[test]
        fn retry_always_backs_off(size_mb in 51u64..400) {
            let plan = plan_for(mb(size_mb), &CompressionConfig::video_defaults());
            prop_assert!(plan.retry.scale < plan.initial.scale);
            prop_assert_eq!(plan.retry.bitrate_bps, plan.initial.bitrate_bps / 2);
            prop_assert!(plan.initial.bitrate_bps >= 500_000);
            prop_assert!(plan.initial.bitrate_bps <= 1_000_000);
        }
    }
}
