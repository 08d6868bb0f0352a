use std::io::BufReader;
use std::path::Path;

use fast_image_resize::{self as fir, images::Image as FirImage};

use crate::domain;

/// Hamming distance at or below which two hashes count as similar.
pub const SIMILARITY_THRESHOLD: u32 = 10;

/// 64-bit difference hash over a 9x8 grayscale grid: one bit per adjacent
/// horizontal pixel pair, set when the left pixel is darker than the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerceptualHash(pub u64);

impl PerceptualHash {
    pub fn distance(self, other: PerceptualHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    pub fn is_similar_to(self, other: PerceptualHash) -> bool {
        self.distance(other) <= SIMILARITY_THRESHOLD
    }

    pub fn confidence(self, other: PerceptualHash) -> f32 {
        confidence_for_distance(self.distance(other))
    }
}

/// Map a Hamming distance to a confidence in (0, 1]. Distance 0 scores just
/// under 1 so downstream consumers can still distinguish "same file" checks
/// done by other means.
pub fn confidence_for_distance(distance: u32) -> f32 {
    if distance > SIMILARITY_THRESHOLD {
        return 0.0;
    }
    let span = SIMILARITY_THRESHOLD as f32 + 1.0;
    (span - distance as f32 - 0.1) / span
}

/// Distance and confidence in one call.
pub fn similarity(a: PerceptualHash, b: PerceptualHash) -> (u32, f32) {
    let distance = a.distance(b);
    (distance, confidence_for_distance(distance))
}

/// Compute the perceptual hash of a file. Total: returns None for videos,
/// unsupported extensions, and files that fail to decode.
pub fn compute(path: &Path) -> Option<PerceptualHash> {
    if !domain::is_supported_image(path) {
        return None;
    }
    let pixels = load_9x8_grayscale(path)?;
    Some(PerceptualHash(dhash_bits(&pixels)))
}

/// Decode, apply EXIF orientation, resize RGB to 9x8, then convert only
/// those 72 pixels to grayscale. Orientation is applied before the resize so
/// rotation-tagged originals hash like their physically-rotated exports.
fn load_9x8_grayscale(path: &Path) -> Option<[u8; 72]> {
    let img = image::open(path).ok()?;
    let rgb = img.to_rgb8();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);

    let orientation = read_exif_orientation(path);
    let (rgb_data, w, h) = apply_orientation_rgb(rgb.as_raw(), w, h, orientation);

    // SIMD resize RGB to 9x8 (216 bytes output instead of millions)
    let src = FirImage::from_vec_u8(w as u32, h as u32, rgb_data, fir::PixelType::U8x3).ok()?;
    let mut dst = FirImage::new(9, 8, fir::PixelType::U8x3);
    fir::Resizer::new().resize(&src, &mut dst, None).ok()?;

    // BT.601 luma for the 72 surviving pixels
    let rgb_buf = dst.buffer();
    let mut gray = [0u8; 72];
    for i in 0..72 {
        let r = rgb_buf[i * 3] as f32;
        let g = rgb_buf[i * 3 + 1] as f32;
        let b = rgb_buf[i * 3 + 2] as f32;
        gray[i] = (0.299 * r + 0.587 * g + 0.114 * b) as u8;
    }
    Some(gray)
}

/// Read EXIF orientation tag (1-8). Returns 1 (normal) if missing or unreadable.
fn read_exif_orientation(path: &Path) -> u8 {
    let read = || -> Option<u8> {
        let file = std::fs::File::open(path).ok()?;
        let mut reader = BufReader::new(file);
        let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
        let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
        field.value.get_uint(0).map(|v| v as u8)
    };
    read().unwrap_or(1)
}

/// Apply EXIF orientation to an RGB buffer, returning corrected buffer and new dimensions.
fn apply_orientation_rgb(buf: &[u8], w: usize, h: usize, orientation: u8) -> (Vec<u8>, usize, usize) {
    if orientation == 1 {
        return (buf.to_vec(), w, h);
    }

    let pixel_count = w * h;
    let mut out = vec![0u8; pixel_count * 3];
    let (new_w, new_h) = if orientation >= 5 { (h, w) } else { (w, h) };

    for y in 0..h {
        for x in 0..w {
            let src_idx = (y * w + x) * 3;
            let (dx, dy) = match orientation {
                2 => (w - 1 - x, y),
                3 => (w - 1 - x, h - 1 - y),
                4 => (x, h - 1 - y),
                5 => (y, x),
                6 => (h - 1 - y, x),
                7 => (h - 1 - y, w - 1 - x),
                8 => (y, w - 1 - x),
                _ => (x, y),
            };
            let dst_idx = (dy * new_w + dx) * 3;
            out[dst_idx..dst_idx + 3].copy_from_slice(&buf[src_idx..src_idx + 3]);
        }
    }
    (out, new_w, new_h)
}

/// For each row of 9 pixels, compare adjacent pairs → 8 bits per row × 8 rows = 64 bits.
fn dhash_bits(pixels: &[u8; 72]) -> u64 {
    let mut hash: u64 = 0;
    let mut bit = 0;
    for row in 0..8 {
        for col in 0..8 {
            let left = pixels[row * 9 + col];
            let right = pixels[row * 9 + col + 1];
            if left < right {
                hash |= 1 << bit;
            }
            bit += 1;
        }
    }
    hash
}
