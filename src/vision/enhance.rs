//! Adaptive image enhancement for card-title OCR
//!
//! Runs a fixed sequence of pixel stages on an RGBA frame, each enabled or
//! tuned by the [`EnhancementProfile`] of the card type being scanned:
//!
//! 1. canvas normalization (long edge <= max, short edge >= min)
//! 2. glare suppression
//! 3. reflection normalization
//! 4. gamma
//! 5. linear brightness/contrast
//! 6. dark-background inversion
//! 7. Sobel edge boost or tiled local contrast
//! 8. histogram equalization
//! 9. 3x3 blur or sharpen
//!
//! Every stage writes `u8` channels, so output is clamped to [0, 255] after
//! each step. Alpha is never modified. 3x3 neighbourhood stages leave the
//! one-pixel border untouched.

use image::imageops::{self, FilterType};
use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::profiles::{DenoiseMode, EdgeMode, EnhancementProfile};
use crate::capture::CapturedFrame;
use crate::error::EnhancementError;

pub const DEFAULT_MAX_EDGE: u32 = 1200;
pub const DEFAULT_MIN_EDGE: u32 = 600;

/// Flat offset added to glare pixels after scaling
const GLARE_OFFSET: f32 = 30.0;
/// Pixels brighter than this multiple of the mean luminance are reflections
const REFLECTION_RATIO: f32 = 1.5;
/// Luminance below which a pixel counts as dark
const DARK_LUMINANCE: u8 = 128;
/// Fraction of dark pixels above which the frame is inverted
const DARK_FRACTION: f32 = 0.6;
/// Weight of the Sobel magnitude added back into luminance
const SOBEL_GAIN: f32 = 0.25;
/// Maximum extra local-contrast stretch (applied to the darkest tiles)
const TILE_PULL: f32 = 0.5;

const BLUR_KERNEL: [[i32; 3]; 3] = [[1, 1, 1], [1, 1, 1], [1, 1, 1]];
const SHARPEN_KERNEL: [[i32; 3]; 3] = [[0, -1, 0], [-1, 5, -1], [0, -1, 0]];

/// Resolution band the OCR stage is tuned for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasBounds {
    /// Longest edge after normalization
    pub max_edge: u32,
    /// Shortest edge after normalization (unless that would break `max_edge`)
    pub min_edge: u32,
}

impl Default for CanvasBounds {
    fn default() -> Self {
        Self {
            max_edge: DEFAULT_MAX_EDGE,
            min_edge: DEFAULT_MIN_EDGE,
        }
    }
}

/// Enhance a frame with the default canvas bounds
pub fn enhance(frame: &CapturedFrame, profile: &EnhancementProfile) -> Result<CapturedFrame, EnhancementError> {
    enhance_with_bounds(frame, profile, CanvasBounds::default())
}

/// Enhance a frame for OCR
///
/// Pure and deterministic: the same frame and profile always produce the same
/// pixels.
pub fn enhance_with_bounds(
    frame: &CapturedFrame,
    profile: &EnhancementProfile,
    bounds: CanvasBounds,
) -> Result<CapturedFrame, EnhancementError> {
    if !frame.is_valid() {
        return Err(EnhancementError::InvalidFrame(format!(
            "{}x{} frame with {} bytes",
            frame.width,
            frame.height,
            frame.data.len()
        )));
    }

    let (mut data, width, height) = normalize_canvas(frame, bounds)?;

    if let Some(factor) = profile.glare_reduction {
        suppress_glare(&mut data, profile.reflection_threshold, factor);
    }

    if profile.normalize_reflections {
        normalize_reflections(&mut data);
    }

    if (profile.gamma - 1.0).abs() > f32::EPSILON {
        apply_lut(&mut data, &gamma_table(profile.gamma));
    }

    if (profile.contrast_boost - 1.0).abs() > f32::EPSILON || profile.brightness.abs() > f32::EPSILON {
        apply_lut(&mut data, &brightness_contrast_table(profile.contrast_boost, profile.brightness));
    }

    if profile.invert_dark_text {
        invert_if_dark(&mut data);
    }

    match profile.edge_enhance {
        EdgeMode::None => {}
        EdgeMode::Sobel => data = sobel_boost(&data, width, height),
        EdgeMode::AdaptiveTiles => adaptive_tile_contrast(&mut data, width, height, profile.adaptive_tile_size),
    }

    if profile.histogram_equalize {
        equalize_histogram(&mut data, width, height);
    }

    match profile.denoise {
        DenoiseMode::None => {}
        DenoiseMode::Blur => data = convolve3x3(&data, width, height, &BLUR_KERNEL, 9),
        DenoiseMode::Sharpen => data = convolve3x3(&data, width, height, &SHARPEN_KERNEL, 1),
    }

    debug!(
        "Enhanced {}x{} frame to {}x{} ({:?} edges, {:?} denoise)",
        frame.width, frame.height, width, height, profile.edge_enhance, profile.denoise
    );

    Ok(CapturedFrame {
        data,
        width,
        height,
        timestamp: frame.timestamp,
    })
}

/// Integer BT.601 luminance
pub(crate) fn luminance(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
}

/// Target dimensions for the canvas band; unchanged when already inside it
pub(crate) fn canvas_dimensions(width: u32, height: u32, bounds: CanvasBounds) -> (u32, u32) {
    let long = width.max(height) as f64;
    let short = width.min(height) as f64;

    let scale = if long > bounds.max_edge as f64 {
        bounds.max_edge as f64 / long
    } else if short < bounds.min_edge as f64 {
        (bounds.min_edge as f64 / short).min(bounds.max_edge as f64 / long)
    } else {
        1.0
    };

    if (scale - 1.0).abs() < f64::EPSILON {
        return (width, height);
    }

    let new_width = ((width as f64 * scale).round() as u32).max(1);
    let new_height = ((height as f64 * scale).round() as u32).max(1);
    (new_width, new_height)
}

fn normalize_canvas(frame: &CapturedFrame, bounds: CanvasBounds) -> Result<(Vec<u8>, u32, u32), EnhancementError> {
    let (width, height) = canvas_dimensions(frame.width, frame.height, bounds);
    if (width, height) == frame.dimensions() {
        return Ok((frame.data.clone(), width, height));
    }

    let source = frame
        .to_rgba_image()
        .ok_or_else(|| EnhancementError::InvalidFrame("buffer does not match dimensions".to_string()))?;
    let resized = imageops::resize(&source, width, height, FilterType::Triangle);
    debug!(
        "Canvas normalized {}x{} -> {}x{}",
        frame.width, frame.height, width, height
    );
    Ok((resized.into_raw(), width, height))
}

/// Darken pixels whose R, G and B all exceed `threshold`
fn suppress_glare(data: &mut [u8], threshold: u8, factor: f32) {
    for chunk in data.chunks_exact_mut(4) {
        if chunk[0] > threshold && chunk[1] > threshold && chunk[2] > threshold {
            for value in chunk.iter_mut().take(3) {
                *value = (*value as f32 * factor + GLARE_OFFSET).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Scale pixels brighter than 1.5x the mean luminance down to that level
fn normalize_reflections(data: &mut [u8]) {
    let pixels = data.len() / 4;
    if pixels == 0 {
        return;
    }

    let total: u64 = data
        .chunks_exact(4)
        .map(|c| luminance(c[0], c[1], c[2]) as u64)
        .sum();
    let mean = total as f32 / pixels as f32;
    let limit = mean * REFLECTION_RATIO;
    if limit >= 255.0 {
        return;
    }

    for chunk in data.chunks_exact_mut(4) {
        let lum = luminance(chunk[0], chunk[1], chunk[2]) as f32;
        if lum > limit {
            let ratio = limit / lum;
            for value in chunk.iter_mut().take(3) {
                *value = (*value as f32 * ratio).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// `table[i] = 255 * (i / 255) ^ gamma`
pub(crate) fn gamma_table(gamma: f32) -> [u8; 256] {
    let mut table = [0u8; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let normalized = i as f32 / 255.0;
        *entry = (255.0 * normalized.powf(gamma)).round().clamp(0.0, 255.0) as u8;
    }
    table
}

/// `table[i] = (i - 128) * contrast + 128 + brightness`
pub(crate) fn brightness_contrast_table(contrast: f32, brightness: f32) -> [u8; 256] {
    let mut table = [0u8; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let adjusted = (i as f32 - 128.0) * contrast + 128.0 + brightness;
        *entry = adjusted.round().clamp(0.0, 255.0) as u8;
    }
    table
}

/// Remap R, G and B through a lookup table
fn apply_lut(data: &mut [u8], table: &[u8; 256]) {
    for chunk in data.chunks_exact_mut(4) {
        for value in chunk.iter_mut().take(3) {
            *value = table[*value as usize];
        }
    }
}

/// Invert RGB when more than 60% of pixels are dark
fn invert_if_dark(data: &mut [u8]) {
    let pixels = data.len() / 4;
    if pixels == 0 {
        return;
    }

    let dark = data
        .chunks_exact(4)
        .filter(|c| luminance(c[0], c[1], c[2]) < DARK_LUMINANCE)
        .count();

    if dark as f32 / pixels as f32 > DARK_FRACTION {
        debug!("Inverting dark frame ({} of {} pixels dark)", dark, pixels);
        for chunk in data.chunks_exact_mut(4) {
            chunk[0] = 255 - chunk[0];
            chunk[1] = 255 - chunk[1];
            chunk[2] = 255 - chunk[2];
        }
    }
}

fn luminance_plane(data: &[u8]) -> Vec<u8> {
    data.chunks_exact(4)
        .map(|c| luminance(c[0], c[1], c[2]))
        .collect()
}

/// Add a fraction of the Sobel gradient magnitude to every interior pixel
fn sobel_boost(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let mut result = data.to_vec();
    if w < 3 || h < 3 {
        return result;
    }

    let lum = luminance_plane(data);
    let at = |x: usize, y: usize| lum[y * w + x] as i32;

    result
        .par_chunks_mut(w * 4)
        .enumerate()
        .filter(|(y, _)| *y > 0 && *y < h - 1)
        .for_each(|(y, row)| {
            for x in 1..(w - 1) {
                let gx = at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1)
                    - at(x - 1, y - 1)
                    - 2 * at(x - 1, y)
                    - at(x - 1, y + 1);
                let gy = at(x - 1, y + 1) + 2 * at(x, y + 1) + at(x + 1, y + 1)
                    - at(x - 1, y - 1)
                    - 2 * at(x, y - 1)
                    - at(x + 1, y - 1);
                let magnitude = ((gx * gx + gy * gy) as f32).sqrt();
                let delta = (magnitude * SOBEL_GAIN).round() as i32;
                if delta == 0 {
                    continue;
                }

                let idx = x * 4;
                for c in 0..3 {
                    row[idx + c] = (row[idx + c] as i32 + delta).clamp(0, 255) as u8;
                }
            }
        });

    result
}

/// Stretch each tile around its own mean luminance
///
/// Darker tiles get a stronger stretch, which evens out uneven lighting
/// without a global histogram operation. Tiles are independent, so the result
/// does not depend on processing order.
fn adaptive_tile_contrast(data: &mut [u8], width: u32, height: u32, tile_size: u32) {
    let w = width as usize;
    let tile = tile_size.max(1) as usize;
    if w == 0 || height == 0 {
        return;
    }

    data.par_chunks_mut(w * 4 * tile).for_each(|band| {
        let band_rows = band.len() / (w * 4);
        for tile_x in (0..w).step_by(tile) {
            let x_end = (tile_x + tile).min(w);

            let mut total = 0u64;
            let mut count = 0u64;
            for row in 0..band_rows {
                for x in tile_x..x_end {
                    let idx = (row * w + x) * 4;
                    total += luminance(band[idx], band[idx + 1], band[idx + 2]) as u64;
                    count += 1;
                }
            }
            if count == 0 {
                continue;
            }

            let mean = total as f32 / count as f32;
            let factor = 1.0 + TILE_PULL * (1.0 - mean / 255.0);

            for row in 0..band_rows {
                for x in tile_x..x_end {
                    let idx = (row * w + x) * 4;
                    for c in 0..3 {
                        let value = band[idx + c] as f32;
                        band[idx + c] = (mean + (value - mean) * factor).round().clamp(0.0, 255.0) as u8;
                    }
                }
            }
        }
    });
}

/// Histogram equalization driven by the luminance CDF
fn equalize_histogram(data: &mut [u8], width: u32, height: u32) {
    let Some(gray) = GrayImage::from_raw(width, height, luminance_plane(data)) else {
        return;
    };

    let cumulative = imageproc::stats::cumulative_histogram(&gray);
    let cdf = &cumulative.channels[0];
    let total = width as u64 * height as u64;
    let cdf_min = cdf.iter().copied().find(|&v| v > 0).unwrap_or(0) as u64;
    if total <= cdf_min {
        // Single luminance level, nothing to spread
        return;
    }

    let mut table = [0u8; 256];
    for (value, entry) in table.iter_mut().enumerate() {
        let below = (cdf[value] as u64).saturating_sub(cdf_min);
        *entry = ((below as f64 / (total - cdf_min) as f64) * 255.0).round().clamp(0.0, 255.0) as u8;
    }

    // Remap luminance and scale RGB with it so hue is kept
    for (pixel, &lum) in data.chunks_exact_mut(4).zip(gray.as_raw()) {
        let target = table[lum as usize];
        if lum == 0 {
            pixel[..3].fill(target);
            continue;
        }
        let scale = target as f32 / lum as f32;
        for value in pixel.iter_mut().take(3) {
            *value = (*value as f32 * scale).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Apply a 3x3 kernel to RGB of every interior pixel
fn convolve3x3(data: &[u8], width: u32, height: u32, kernel: &[[i32; 3]; 3], divisor: i32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let mut result = data.to_vec();
    if w < 3 || h < 3 {
        return result;
    }

    result
        .par_chunks_mut(w * 4)
        .enumerate()
        .filter(|(y, _)| *y > 0 && *y < h - 1)
        .for_each(|(y, row)| {
            for x in 1..(w - 1) {
                for c in 0..3 {
                    let mut sum = 0i32;
                    for (ky, kernel_row) in kernel.iter().enumerate() {
                        for (kx, weight) in kernel_row.iter().enumerate() {
                            let sy = y + ky - 1;
                            let sx = x + kx - 1;
                            sum += data[(sy * w + sx) * 4 + c] as i32 * weight;
                        }
                    }
                    let value = (sum + divisor / 2).div_euclid(divisor);
                    row[x * 4 + c] = value.clamp(0, 255) as u8;
                }
            }
        });

    result
}
