//! Card-type enhancement presets
//!
//! One constant [`EnhancementProfile`] per physical printing style. Presets are
//! never mutated; callers pick one by [`CardType`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EnhancementError;

/// Physical printing style of the card being scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    /// Holographic/foil finish with specular glare
    Foil,
    /// Aged printing, yellowed stock, faded ink
    OldCard,
    /// Full-art card without a frame around the title
    Borderless,
    /// Dark frame or underexposed capture
    Dark,
    /// Washed out, flat lighting
    LowContrast,
    #[default]
    Standard,
}

impl CardType {
    /// All card types, in preset table order
    pub const ALL: [CardType; 6] = [
        CardType::Foil,
        CardType::OldCard,
        CardType::Borderless,
        CardType::Dark,
        CardType::LowContrast,
        CardType::Standard,
    ];

    /// Tag used in configuration and on the command line
    pub fn tag(&self) -> &'static str {
        match self {
            CardType::Foil => "foil",
            CardType::OldCard => "old_card",
            CardType::Borderless => "borderless",
            CardType::Dark => "dark",
            CardType::LowContrast => "low_contrast",
            CardType::Standard => "standard",
        }
    }

    /// Enhancement preset for this card type
    pub fn profile(&self) -> &'static EnhancementProfile {
        match self {
            CardType::Foil => &EnhancementProfile::FOIL,
            CardType::OldCard => &EnhancementProfile::OLD_CARD,
            CardType::Borderless => &EnhancementProfile::BORDERLESS,
            CardType::Dark => &EnhancementProfile::DARK,
            CardType::LowContrast => &EnhancementProfile::LOW_CONTRAST,
            CardType::Standard => &EnhancementProfile::STANDARD,
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for CardType {
    type Err = EnhancementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "foil" | "holo" => Ok(CardType::Foil),
            "old_card" | "old" | "aged" => Ok(CardType::OldCard),
            "borderless" | "full_art" => Ok(CardType::Borderless),
            "dark" => Ok(CardType::Dark),
            "low_contrast" => Ok(CardType::LowContrast),
            "standard" | "normal" => Ok(CardType::Standard),
            _ => Err(EnhancementError::UnsupportedProfile(s.to_string())),
        }
    }
}

/// Edge / local-contrast stage selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeMode {
    None,
    /// 3x3 Sobel magnitude added to luminance
    Sobel,
    /// Tiled local-contrast stretch around each tile's mean
    AdaptiveTiles,
}

/// Final 3x3 convolution selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenoiseMode {
    None,
    /// Box-average noise reduction
    Blur,
    /// `[[0,-1,0],[-1,5,-1],[0,-1,0]]`
    Sharpen,
}

/// Parameters for one run of the enhancement pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhancementProfile {
    /// Brightness multiplier for glare pixels (`None` disables glare suppression)
    pub glare_reduction: Option<f32>,
    /// Channel value all of R, G and B must exceed for a pixel to count as glare
    pub reflection_threshold: u8,
    /// Scale over-bright pixels back toward the mean luminance
    pub normalize_reflections: bool,
    /// Linear contrast factor around mid-grey (1.0 = unchanged)
    pub contrast_boost: f32,
    /// Gamma exponent (< 1.0 brightens shadows, 1.0 = unchanged)
    pub gamma: f32,
    /// Flat brightness offset added after contrast
    pub brightness: f32,
    /// Invert when the frame is mostly dark (light text on dark background)
    pub invert_dark_text: bool,
    pub edge_enhance: EdgeMode,
    /// Tile edge length in pixels for [`EdgeMode::AdaptiveTiles`]
    pub adaptive_tile_size: u32,
    pub histogram_equalize: bool,
    pub denoise: DenoiseMode,
}

impl EnhancementProfile {
    /// Leaves pixels untouched (canvas normalization still applies)
    pub const IDENTITY: EnhancementProfile = EnhancementProfile {
        glare_reduction: None,
        reflection_threshold: 255,
        normalize_reflections: false,
        contrast_boost: 1.0,
        gamma: 1.0,
        brightness: 0.0,
        invert_dark_text: false,
        edge_enhance: EdgeMode::None,
        adaptive_tile_size: 64,
        histogram_equalize: false,
        denoise: DenoiseMode::None,
    };

    pub const FOIL: EnhancementProfile = EnhancementProfile {
        glare_reduction: Some(0.7),
        reflection_threshold: 220,
        normalize_reflections: true,
        contrast_boost: 1.3,
        brightness: -10.0,
        denoise: DenoiseMode::Blur,
        ..Self::IDENTITY
    };

    pub const OLD_CARD: EnhancementProfile = EnhancementProfile {
        contrast_boost: 1.4,
        gamma: 0.8,
        brightness: 10.0,
        invert_dark_text: true,
        denoise: DenoiseMode::Sharpen,
        ..Self::IDENTITY
    };

    pub const BORDERLESS: EnhancementProfile = EnhancementProfile {
        contrast_boost: 1.2,
        edge_enhance: EdgeMode::Sobel,
        denoise: DenoiseMode::Sharpen,
        ..Self::IDENTITY
    };

    pub const DARK: EnhancementProfile = EnhancementProfile {
        contrast_boost: 1.3,
        gamma: 0.6,
        brightness: 20.0,
        invert_dark_text: true,
        denoise: DenoiseMode::Blur,
        ..Self::IDENTITY
    };

    pub const LOW_CONTRAST: EnhancementProfile = EnhancementProfile {
        contrast_boost: 1.5,
        edge_enhance: EdgeMode::AdaptiveTiles,
        adaptive_tile_size: 64,
        histogram_equalize: true,
        denoise: DenoiseMode::Sharpen,
        ..Self::IDENTITY
    };

    pub const STANDARD: EnhancementProfile = EnhancementProfile {
        contrast_boost: 1.2,
        denoise: DenoiseMode::Sharpen,
        ..Self::IDENTITY
    };
}

impl Default for EnhancementProfile {
    fn default() -> Self {
        Self::STANDARD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        for card_type in CardType::ALL {
            assert_eq!(card_type.tag().parse::<CardType>().unwrap(), card_type);
        }
    }

    #[test]
    fn test_tag_aliases() {
        assert_eq!("Old Card".parse::<CardType>().unwrap(), CardType::OldCard);
        assert_eq!("low-contrast".parse::<CardType>().unwrap(), CardType::LowContrast);
        assert_eq!("HOLO".parse::<CardType>().unwrap(), CardType::Foil);
    }

    #[test]
    fn test_unknown_tag() {
        let err = "etched".parse::<CardType>().unwrap_err();
        assert_eq!(err, EnhancementError::UnsupportedProfile("etched".to_string()));
    }

    #[test]
    fn test_presets_never_blur_and_sharpen_together() {
        // A single denoise slot makes this structural; check the intent per preset
        assert_eq!(CardType::Foil.profile().denoise, DenoiseMode::Blur);
        assert_eq!(CardType::Dark.profile().denoise, DenoiseMode::Blur);
        assert_eq!(CardType::Standard.profile().denoise, DenoiseMode::Sharpen);
    }

    #[test]
    fn test_preset_specifics() {
        assert!(CardType::Foil.profile().glare_reduction.is_some());
        assert!(CardType::Foil.profile().normalize_reflections);
        assert!(CardType::OldCard.profile().gamma < 1.0);
        assert!(CardType::OldCard.profile().invert_dark_text);
        assert_eq!(CardType::Borderless.profile().edge_enhance, EdgeMode::Sobel);
        assert_eq!(CardType::LowContrast.profile().edge_enhance, EdgeMode::AdaptiveTiles);
        assert!(CardType::LowContrast.profile().histogram_equalize);
        assert_eq!(EnhancementProfile::default(), EnhancementProfile::STANDARD);
    }
}
