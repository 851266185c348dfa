// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 MediaPrep Contributors

//! Custom test assertions for compressed output.

use std::path::Path;

/// Assert that `data` starts with a JPEG SOI marker.
pub fn assert_is_jpeg(data: &[u8]) {
    assert!(
        data.len() >= 3 && data[..3] == [0xFF, 0xD8, 0xFF],
        "expected JPEG data, got {} bytes starting {:02X?}",
        data.len(),
        &data[..data.len().min(4)]
    );
}

/// Assert that encoded image bytes decode to at most `max_width`x`max_height`.
pub fn assert_fits_box(data: &[u8], max_width: u32, max_height: u32) {
    let img = image::load_from_memory(data).expect("output should decode");
    assert!(
        img.width() <= max_width && img.height() <= max_height,
        "{}x{} does not fit {}x{}",
        img.width(),
        img.height(),
        max_width,
        max_height
    );
}

/// Assert that the file at `path` is at most `max_bytes` long.
pub fn assert_file_within(path: &Path, max_bytes: u64) {
    let len = std::fs::metadata(path)
        .unwrap_or_else(|e| panic!("{} should exist: {}", path.display(), e))
        .len();
    assert!(
        len <= max_bytes,
        "{} is {} bytes, budget {}",
        path.display(),
        len,
        max_bytes
    );
}

/// Assert that two files have identical contents.
pub fn assert_same_contents(a: &Path, b: &Path) {
    let left = std::fs::read(a).expect("read left file");
    let right = std::fs::read(b).expect("read right file");
    assert!(
        left == right,
        "{} and {} differ ({} vs {} bytes)",
        a.display(),
        b.display(),
        left.len(),
        right.len()
    );
}
