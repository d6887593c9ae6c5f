//! Card-type detection from frame statistics
//!
//! Used when the caller gives no card-type hint. Purely statistical and
//! deterministic; borderless cards cannot be told apart this way and are only
//! selected by hint.

use tracing::debug;

use super::enhance::luminance;
use super::profiles::CardType;
use crate::capture::CapturedFrame;

/// Channel value above which a pixel counts as a specular highlight
const SPECULAR_LEVEL: u8 = 235;
/// Fraction of specular pixels that indicates a foil finish
const FOIL_SPECULAR_FRACTION: f32 = 0.04;
/// Mean luminance below which the frame is considered dark
const DARK_MEAN: f32 = 70.0;
/// Luminance standard deviation below which the frame is low contrast
const LOW_CONTRAST_STDDEV: f32 = 28.0;
/// Warm (yellowed) tint, mean of (R+G)/2 - B, typical of aged card stock
const AGED_TINT: f32 = 28.0;

/// Summary statistics used for detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub mean_luminance: f32,
    pub luminance_stddev: f32,
    pub specular_fraction: f32,
    pub warm_tint: f32,
}

impl FrameStats {
    /// Compute statistics over every pixel of the frame
    pub fn compute(frame: &CapturedFrame) -> Option<Self> {
        if !frame.is_valid() {
            return None;
        }

        let pixels = frame.pixel_count() as f64;
        let mut sum = 0f64;
        let mut sum_sq = 0f64;
        let mut specular = 0u64;
        let mut tint = 0f64;

        for c in frame.data.chunks_exact(4) {
            let lum = luminance(c[0], c[1], c[2]) as f64;
            sum += lum;
            sum_sq += lum * lum;
            if c[0] > SPECULAR_LEVEL && c[1] > SPECULAR_LEVEL && c[2] > SPECULAR_LEVEL {
                specular += 1;
            }
            tint += (c[0] as f64 + c[1] as f64) / 2.0 - c[2] as f64;
        }

        let mean = sum / pixels;
        let variance = (sum_sq / pixels - mean * mean).max(0.0);

        Some(Self {
            mean_luminance: mean as f32,
            luminance_stddev: variance.sqrt() as f32,
            specular_fraction: (specular as f64 / pixels) as f32,
            warm_tint: (tint / pixels) as f32,
        })
    }
}

/// Pick the enhancement preset best suited to the frame
pub fn detect_card_type(frame: &CapturedFrame) -> CardType {
    let Some(stats) = FrameStats::compute(frame) else {
        return CardType::Standard;
    };

    let card_type = if stats.specular_fraction > FOIL_SPECULAR_FRACTION {
        CardType::Foil
    } else if stats.mean_luminance < DARK_MEAN {
        CardType::Dark
    } else if stats.warm_tint > AGED_TINT {
        CardType::OldCard
    } else if stats.luminance_stddev < LOW_CONTRAST_STDDEV {
        CardType::LowContrast
    } else {
        CardType::Standard
    };

    debug!("Detected card type {} from {:?}", card_type, stats);
    card_type
}
