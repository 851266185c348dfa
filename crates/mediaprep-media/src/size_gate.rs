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

//! Byte-budget short circuit in front of every compressor

use crate::blob::MediaBlob;
use crate::error::{MediaError, Result};

/// Outcome of passing a blob through the gate
#[derive(Debug)]
pub enum Gated {
    /// Already within budget; hand back unchanged
    Within(MediaBlob),
    /// Over budget by `excess_bytes`; compression required
    Exceeds {
        /// The blob, returned to the caller for compression
        blob: MediaBlob,
        /// Bytes above the budget
        excess_bytes: u64,
    },
}

/// Decides whether compression is needed at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeGate {
    max_size_bytes: u64,
}

impl SizeGate {
    /// Create a gate. A zero budget is rejected.
    pub fn new(max_size_bytes: u64) -> Result<Self> {
        if max_size_bytes == 0 {
            return Err(MediaError::invalid_config(
                "size gate budget must be greater than zero",
            ));
        }
        Ok(SizeGate { max_size_bytes })
    }

    /// Budget in bytes
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Whether `len` bytes fit the budget
    pub fn fits(&self, len: u64) -> bool {
        len <= self.max_size_bytes
    }

    /// Route a blob: unchanged if it fits, flagged otherwise
    pub fn gate(&self, blob: MediaBlob) -> Gated {
        let len = blob.len();
        if self.fits(len) {
            Gated::Within(blob)
        } else {
            Gated::Exceeds {
                blob,
                excess_bytes: len - self.max_size_bytes,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_zero_budget() {
        assert!(SizeGate::new(0).is_err());
    }

    #[test]
    fn boundary_is_inclusive() {
        let gate = SizeGate::new(4).unwrap();
        assert!(matches!(
            gate.gate(MediaBlob::new(vec![0; 4], "image/jpeg")),
            Gated::Within(_)
        ));
        match gate.gate(MediaBlob::new(vec![0; 6], "image/jpeg")) {
            Gated::Exceeds { excess_bytes, blob } => {
                assert_eq!(excess_bytes, 2);
                assert_eq!(blob.len(), 6);
            }
            other => panic!("expected Exceeds, got {:?}", other),
        }
    }

    proptest! {
        #[test]
        fn within_returns_identical_blob(len in 0usize..2048, budget in 1u64..4096) {
            let gate = SizeGate::new(budget).unwrap();
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let blob = MediaBlob::new(data.clone(), "image/png");
            match gate.gate(blob) {
                Gated::Within(out) => {
                    prop_assert!(len as u64 <= budget);
                    prop_assert_eq!(out.as_bytes(), &data[..]);
                }
                Gated::Exceeds { blob, excess_bytes } => {
                    prop_assert!(len as u64 > budget);
                    prop_assert_eq!(excess_bytes, len as u64 - budget);
                    prop_assert_eq!(blob.as_bytes(), &data[..]);
                }
            }
        }
    }
}
