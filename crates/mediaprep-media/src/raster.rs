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

//! Off-screen raster surface shared by the image and video pipelines

use crate::error::{MediaError, Result, Stage};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};

/// Largest surface we agree to allocate (64 megapixels)
pub const MAX_SURFACE_PIXELS: u64 = 8192 * 8192;

/// Off-screen RGB pixel buffer frames are painted onto before encoding
#[derive(Debug, Clone)]
pub struct RasterSurface {
    canvas: RgbImage,
}

impl RasterSurface {
    /// Allocate a surface. Zero-sized or oversized surfaces are unavailable.
    pub fn allocate(width: u32, height: u32) -> Result<Self> {
        let pixels = u64::from(width) * u64::from(height);
        if pixels == 0 || pixels > MAX_SURFACE_PIXELS {
            return Err(MediaError::encode_failure(
                Stage::Rendering,
                format!("raster surface unavailable for {}x{}", width, height),
            ));
        }
        Ok(RasterSurface {
            canvas: RgbImage::new(width, height),
        })
    }

    /// Surface width
    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    /// Surface height
    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    /// Paint `source` scaled to fill the surface. Transparency is flattened
    /// onto white, since the lossy targets carry no alpha.
    pub fn paint(&mut self, source: &DynamicImage) {
        let flat = flatten_onto_white(source);
        self.canvas = if flat.dimensions() == self.canvas.dimensions() {
            flat
        } else {
            imageops::resize(&flat, self.width(), self.height(), FilterType::Triangle)
        };
    }

    /// Current pixels
    pub fn pixels(&self) -> &RgbImage {
        &self.canvas
    }

    /// Encode the current pixels as JPEG at `quality` (1-100)
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
            .encode_image(&self.canvas)
            .map_err(|e| MediaError::encode_failure(Stage::Encoding, e.to_string()))?;
        Ok(buffer)
    }
}

fn flatten_onto_white(source: &DynamicImage) -> RgbImage {
    if !source.color().has_alpha() {
        return source.to_rgb8();
    }
    let rgba = source.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Proportionally shrink `(width, height)` to fit the bounding box.
///
/// Scale factor is `min(max_width / width, max_height / height)`, applied once;
/// images already inside the box are left alone.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let scale = f64::min(
        f64::from(max_width) / f64::from(width),
        f64::from(max_height) / f64::from(height),
    );
    scale_by(width, height, scale)
}

/// Scale dimensions by a factor, keeping each side at least one pixel
pub fn scale_by(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let w = (f64::from(width) * scale).round().max(1.0) as u32;
    let h = (f64::from(height) * scale).round().max(1.0) as u32;
    (w, h)
}

/// Round dimensions down to even values (video encoders reject odd sizes)
pub fn even_dimensions(width: u32, height: u32) -> (u32, u32) {
    ((width & !1).max(2), (height & !1).max(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};

    #[test]
    fn unavailable_surfaces() {
        assert!(RasterSurface::allocate(0, 10).is_err());
        assert!(RasterSurface::allocate(100_000, 100_000).is_err());
        assert!(RasterSurface::allocate(16, 9).is_ok());
    }

    #[test]
    fn fit_preserves_aspect_ratio() {
        assert_eq!(fit_within(4000, 3000, 1920, 1080), (1440, 1080));
        assert_eq!(fit_within(3840, 1080, 1920, 1080), (1920, 540));
        assert_eq!(fit_within(800, 600, 1920, 1080), (800, 600));
    }

    #[test]
    fn even_rounding() {
        assert_eq!(even_dimensions(641, 359), (640, 358));
        assert_eq!(even_dimensions(1, 1), (2, 2));
    }

    #[test]
    fn paint_scales_and_flattens_alpha() {
        let transparent = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0]));
        let mut surface = RasterSurface::allocate(4, 4).unwrap();
        surface.paint(&DynamicImage::ImageRgba8(transparent));
        assert_eq!(surface.pixels().dimensions(), (4, 4));
        assert_eq!(surface.pixels().get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn encodes_decodable_jpeg() {
        let mut surface = RasterSurface::allocate(32, 16).unwrap();
        surface.paint(&DynamicImage::ImageRgb8(RgbImage::from_fn(32, 16, |x, y| {
            Rgb([(x * 8) as u8, (y * 16) as u8, 128])
        })));
        let bytes = surface.encode_jpeg(80).unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
    }
}
