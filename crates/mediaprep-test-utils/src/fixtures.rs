// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 MediaPrep Contributors

//! Test fixture generation.
//!
//! Images are synthesized with the `image` crate instead of being checked
//! in, so a test can ask for exactly the dimensions and rough byte size it
//! needs. Noise compresses badly and is used to force sources over budget;
//! gradients compress well and stay small.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Test fixture generation utilities.
pub struct TestFixtures;

impl TestFixtures {
    /// Deterministic pseudo-random RGB noise.
    pub fn noise_image(width: u32, height: u32, seed: u32) -> RgbImage {
        let mut state = seed.max(1);
        RgbImage::from_fn(width, height, |_, _| {
            // xorshift32
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [r, g, b, _] = state.to_le_bytes();
            Rgb([r, g, b])
        })
    }

    /// Smooth horizontal/vertical gradient.
    pub fn gradient_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            Rgb([r, g, 160])
        })
    }

    /// Noise encoded as JPEG at `quality` (1-100).
    pub fn noise_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
        let img = Self::noise_image(width, height, 0x9E37_79B9);
        let mut out = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality)
            .encode_image(&img)
            .expect("encode noise jpeg");
        out
    }

    /// Gradient encoded as JPEG at quality 90.
    pub fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = Self::gradient_image(width, height);
        let mut out = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 90)
            .encode_image(&img)
            .expect("encode gradient jpeg");
        out
    }

    /// Noise encoded as PNG (large, lossless).
    pub fn noise_png(width: u32, height: u32) -> Vec<u8> {
        Self::encode(
            DynamicImage::ImageRgb8(Self::noise_image(width, height, 7)),
            ImageFormat::Png,
        )
    }

    /// Fully transparent RGBA PNG.
    pub fn translucent_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
        Self::encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
    }

    /// Noise JPEG of at least `min_bytes`, grown in ~20% area steps until it gets there.
    pub fn jpeg_at_least(min_bytes: usize) -> Vec<u8> {
        let mut side = 256u32;
        loop {
            let data = Self::noise_jpeg(side, side * 3 / 4, 95);
            if data.len() >= min_bytes {
                return data;
            }
            side = side * 11 / 10;
        }
    }

    /// Decoded dimensions of encoded image bytes.
    pub fn dimensions(data: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory(data).expect("decode fixture");
        (img.width(), img.height())
    }

    /// Write `data` to `dir/name` and return the path.
    pub fn write(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture directory");
        }
        fs::write(&path, data).expect("write fixture");
        path
    }

    /// Zero-filled stand-in for a video source of `bytes` length.
    pub fn video_bytes(bytes: usize) -> Vec<u8> {
        vec![0u8; bytes]
    }

    /// Minimal MP4 with one H.264 video track and, optionally, an audio track.
    ///
    /// Only the header boxes are written (no samples), which is all an MP4
    /// metadata reader needs. `width` and `height` must fit in 16 bits.
    pub fn mp4(width: u32, height: u32, duration_ms: u32, with_audio: bool) -> Vec<u8> {
        let mut moov = mp4_box(b"mvhd", &mvhd(duration_ms));
        moov.extend(video_trak(width, height, duration_ms));
        if with_audio {
            moov.extend(audio_trak(duration_ms));
        }

        let mut ftyp = Vec::new();
        for brand in [b"isom", b"isom", b"iso2", b"avc1"] {
            ftyp.extend_from_slice(brand);
        }
        ftyp[4..8].copy_from_slice(&0x200u32.to_be_bytes());

        let mut out = mp4_box(b"ftyp", &ftyp);
        out.extend(mp4_box(b"moov", &moov));
        out
    }

    /// [`TestFixtures::mp4`] padded with a trailing `free` box to at least
    /// `min_bytes`, so budget logic sees a large source.
    pub fn mp4_of_size(width: u32, height: u32, duration_ms: u32, min_bytes: usize) -> Vec<u8> {
        let mut out = Self::mp4(width, height, duration_ms, true);
        if out.len() + 8 < min_bytes {
            let padding = vec![0u8; min_bytes - out.len() - 8];
            out.extend(mp4_box(b"free", &padding));
        }
        out
    }

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).expect("encode fixture");
        out.into_inner()
    }
}

const MOVIE_TIMESCALE: u32 = 1000;
const IDENTITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

fn mp4_box(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let size = u32::try_from(body.len() + 8).expect("box too large");
    let mut out = Vec::with_capacity(body.len() + 8);
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    out
}

/// Version 0 full-box prefix
fn full_box(flags: u32) -> Vec<u8> {
    (flags & 0x00FF_FFFF).to_be_bytes().to_vec()
}

fn push_u32s(out: &mut Vec<u8>, values: &[u32]) {
    for v in values {
        out.extend_from_slice(&v.to_be_bytes());
    }
}

fn mvhd(duration_ms: u32) -> Vec<u8> {
    let mut body = full_box(0);
    push_u32s(&mut body, &[0, 0, MOVIE_TIMESCALE, duration_ms]);
    // rate, volume, reserved
    body.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    body.extend_from_slice(&0x0100u16.to_be_bytes());
    body.extend_from_slice(&[0u8; 10]);
    push_u32s(&mut body, &IDENTITY_MATRIX);
    // pre_defined, next_track_id
    body.extend_from_slice(&[0u8; 24]);
    body.extend_from_slice(&3u32.to_be_bytes());
    body
}

fn tkhd(track_id: u32, duration_ms: u32, volume: u16, width: u32, height: u32) -> Vec<u8> {
    let mut body = full_box(0x3);
    push_u32s(&mut body, &[0, 0, track_id, 0, duration_ms]);
    // reserved, layer, alternate group
    body.extend_from_slice(&[0u8; 12]);
    body.extend_from_slice(&volume.to_be_bytes());
    body.extend_from_slice(&[0u8; 2]);
    push_u32s(&mut body, &IDENTITY_MATRIX);
    push_u32s(&mut body, &[width << 16, height << 16]);
    mp4_box(b"tkhd", &body)
}

fn mdia(handler: &[u8; 4], timescale: u32, duration_ms: u32, stsd_entries: &[Vec<u8>]) -> Vec<u8> {
    let mut mdhd = full_box(0);
    let duration = u64::from(duration_ms) * u64::from(timescale) / 1000;
    let duration = u32::try_from(duration).expect("duration fits the media timescale");
    push_u32s(&mut mdhd, &[0, 0, timescale, duration]);
    // language "und", pre_defined
    mdhd.extend_from_slice(&0x55C4u16.to_be_bytes());
    mdhd.extend_from_slice(&[0u8; 2]);

    let mut hdlr = full_box(0);
    hdlr.extend_from_slice(&[0u8; 4]);
    hdlr.extend_from_slice(handler);
    hdlr.extend_from_slice(&[0u8; 12]);
    hdlr.push(0);

    let mut stsd = full_box(0);
    stsd.extend_from_slice(&(stsd_entries.len() as u32).to_be_bytes());
    for entry in stsd_entries {
        stsd.extend_from_slice(entry);
    }
    let stbl = mp4_box(b"stbl", &mp4_box(b"stsd", &stsd));

    let mut body = mp4_box(b"mdhd", &mdhd);
    body.extend(mp4_box(b"hdlr", &hdlr));
    body.extend(mp4_box(b"minf", &stbl));
    mp4_box(b"mdia", &body)
}

fn avc1(width: u32, height: u32) -> Vec<u8> {
    let width = u16::try_from(width).expect("width fits in 16 bits");
    let height = u16::try_from(height).expect("height fits in 16 bits");

    let mut body = vec![0u8; 6];
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(&[0u8; 16]);
    body.extend_from_slice(&width.to_be_bytes());
    body.extend_from_slice(&height.to_be_bytes());
    // resolution, reserved, frame count, compressor name, depth, pre_defined
    push_u32s(&mut body, &[0x0048_0000, 0x0048_0000, 0]);
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(&[0u8; 32]);
    body.extend_from_slice(&0x0018u16.to_be_bytes());
    body.extend_from_slice(&(-1i16).to_be_bytes());
    // Baseline profile decoder record with no parameter sets
    body.extend(mp4_box(b"avcC", &[1, 0x42, 0xC0, 0x1E, 0xFF, 0xE0, 0x00]));
    mp4_box(b"avc1", &body)
}

fn video_trak(width: u32, height: u32, duration_ms: u32) -> Vec<u8> {
    let mut body = tkhd(1, duration_ms, 0, width, height);
    body.extend(mdia(b"vide", 15_360, duration_ms, &[avc1(width, height)]));
    mp4_box(b"trak", &body)
}

fn audio_trak(duration_ms: u32) -> Vec<u8> {
    let mut body = tkhd(2, duration_ms, 0x0100, 0, 0);
    body.extend(mdia(b"soun", 48_000, duration_ms, &[]));
    mp4_box(b"trak", &body)
}
