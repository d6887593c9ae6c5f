//! Text Recognition Adapter
//!
//! Wraps a local OCR capability behind [`LocalOcr`] and reads the card title
//! with a small multi-zone strategy: the title bar in single-line mode first,
//! the whole card in block mode only when the title bar read is weak.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::capture::CapturedFrame;

/// Characters that can appear in a printed card name
pub const CARD_NAME_WHITELIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789 ',-";

/// Minimum letters a cleaned line needs to be treated as a name
const MIN_NAME_LETTERS: usize = 3;

/// Raw output of one OCR call
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    /// Recognized text, lines separated by `\n`
    pub text: String,
    /// Engine confidence (0 - 100)
    pub confidence: f32,
}

/// Clamp an engine confidence into 0 - 100; non-finite values count as 0
pub fn normalize_confidence(confidence: f32) -> f32 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Local OCR capability
///
/// Stateless per call. Implementations receive encoded image bytes (PNG).
#[async_trait]
pub trait LocalOcr: Send + Sync {
    /// Engine name for logs
    fn name(&self) -> &str;

    /// Recognize text restricted to `whitelist`
    async fn recognize(&self, image_bytes: &[u8], whitelist: &str, single_line: bool) -> Result<OcrOutput>;
}

/// Region of the card handed to the OCR engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrZone {
    /// Band at the top of the card holding the printed name
    TitleBar,
    /// Entire frame
    FullCard,
}

impl OcrZone {
    /// Zones in the order they are tried
    pub const ORDER: [OcrZone; 2] = [OcrZone::TitleBar, OcrZone::FullCard];

    /// Pixel rectangle (x, y, width, height) of this zone in a frame
    pub fn bounds(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        match self {
            OcrZone::TitleBar => (
                (width as f32 * 0.04) as u32,
                (height as f32 * 0.03) as u32,
                (width as f32 * 0.76) as u32,
                (height as f32 * 0.09) as u32,
            ),
            OcrZone::FullCard => (0, 0, width, height),
        }
    }

    /// Whether the engine should treat the zone as one text line
    pub fn single_line(&self) -> bool {
        matches!(self, OcrZone::TitleBar)
    }
}

/// What one zone read
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneReading {
    pub zone: OcrZone,
    pub text: String,
    /// Engine confidence (0 - 100)
    pub confidence: f32,
    pub elapsed_ms: u64,
}

/// Best reading across zones plus every per-zone reading
#[derive(Debug, Clone, PartialEq)]
pub struct TextRecognition {
    pub text: String,
    pub confidence: f32,
    pub zone: OcrZone,
    pub readings: Vec<ZoneReading>,
}

/// OCR text reduced to a card-name candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedText {
    /// Name as read, noise stripped
    pub display: String,
    /// Lower-cased form used for catalog lookup
    pub key: String,
}

/// Reduce raw OCR text to a name candidate
///
/// Keeps letters, digits, spaces, apostrophes, commas and hyphens, takes the
/// first line with at least three letters, drops trailing numeric tokens
/// (mana-cost noise) and collapses whitespace.
pub fn clean_ocr_text(raw: &str) -> Option<CleanedText> {
    for line in raw.lines() {
        let filtered: String = line
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || matches!(c, '\'' | ',' | '-') {
                    c
                } else {
                    ' '
                }
            })
            .collect();

        let mut tokens: Vec<&str> = filtered
            .split_whitespace()
            .filter(|token| token.chars().any(char::is_alphanumeric))
            .collect();
        while tokens
            .last()
            .is_some_and(|token| token.chars().all(|c| c.is_ascii_digit() || !c.is_alphanumeric()))
        {
            tokens.pop();
        }

        let joined = tokens.join(" ");
        let display = joined.trim_matches(|c| c == ',' || c == '-').trim().to_string();
        if display.chars().filter(|c| c.is_alphabetic()).count() >= MIN_NAME_LETTERS {
            let key = display.to_lowercase();
            return Some(CleanedText { display, key });
        }
    }
    None
}

/// Multi-zone reader over a [`LocalOcr`] engine
pub struct TextRecognizer {
    engine: Arc<dyn LocalOcr>,
    /// A title-bar read at or above this confidence skips the full-card pass
    accept_confidence: f32,
}

impl TextRecognizer {
    pub fn new(engine: Arc<dyn LocalOcr>, accept_confidence: f32) -> Self {
        Self {
            engine,
            accept_confidence,
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Read the card title from an enhanced frame
    ///
    /// Fails only when every zone failed at the engine level.
    pub async fn recognize(&self, frame: &CapturedFrame) -> Result<TextRecognition> {
        let mut readings: Vec<ZoneReading> = Vec::new();
        let mut last_error = None;

        for zone in OcrZone::ORDER {
            let (x, y, w, h) = zone.bounds(frame.width, frame.height);
            if w == 0 || h == 0 {
                debug!("Skipping empty {:?} zone on {}x{} frame", zone, frame.width, frame.height);
                continue;
            }

            let region = frame.crop(x, y, w, h);
            let bytes = match region.encode_png() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to encode {:?} zone: {:#}", zone, e);
                    last_error = Some(e);
                    continue;
                }
            };

            let start = Instant::now();
            match self
                .engine
                .recognize(&bytes, CARD_NAME_WHITELIST, zone.single_line())
                .await
            {
                Ok(output) => {
                    let reading = ZoneReading {
                        zone,
                        text: output.text,
                        confidence: normalize_confidence(output.confidence),
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    };
                    debug!(
                        "{} read {:?} zone: {:?} ({:.0})",
                        self.engine.name(),
                        zone,
                        reading.text,
                        reading.confidence
                    );
                    let accepted = reading.confidence >= self.accept_confidence
                        && clean_ocr_text(&reading.text).is_some();
                    readings.push(reading);
                    if accepted {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{} failed on {:?} zone: {:#}", self.engine.name(), zone, e);
                    last_error = Some(e);
                }
            }
        }

        let best = readings
            .iter()
            .filter(|r| clean_ocr_text(&r.text).is_some())
            .fold(None::<&ZoneReading>, |best, r| match best {
                Some(b) if b.confidence >= r.confidence => Some(b),
                _ => Some(r),
            })
            .or_else(|| readings.first());

        match best {
            Some(best) => Ok(TextRecognition {
                text: best.text.clone(),
                confidence: best.confidence,
                zone: best.zone,
                readings: readings.clone(),
            }),
            None => Err(last_error.unwrap_or_else(|| anyhow!("frame too small for any OCR zone"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Returns scripted outputs in call order and records the mode of each call
    struct ScriptedOcr {
        outputs: Mutex<Vec<Result<OcrOutput>>>,
        calls: Mutex<Vec<bool>>,
    }

    impl ScriptedOcr {
        fn new(outputs: Vec<Result<OcrOutput>>) -> Self {
            Self {
                outputs: Mutex::new(outputs.into_iter().rev().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LocalOcr for ScriptedOcr {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn recognize(&self, image_bytes: &[u8], whitelist: &str, single_line: bool) -> Result<OcrOutput> {
            assert!(!image_bytes.is_empty());
            assert_eq!(whitelist, CARD_NAME_WHITELIST);
            self.calls.lock().push(single_line);
            self.outputs
                .lock()
                .pop()
                .unwrap_or_else(|| Err(anyhow!("no more scripted outputs")))
        }
    }

    fn output(text: &str, confidence: f32) -> Result<OcrOutput> {
        Ok(OcrOutput {
            text: text.to_string(),
            confidence,
        })
    }

    fn frame() -> CapturedFrame {
        CapturedFrame::filled(200, 280, [230, 230, 230, 255])
    }

    #[test]
    fn test_clean_ocr_text() {
        let cleaned = clean_ocr_text("  Black   Lotus 0\n").unwrap();
        assert_eq!(cleaned.display, "Black Lotus");
        assert_eq!(cleaned.key, "black lotus");

        let cleaned = clean_ocr_text("~~\n@@\n|Shivan Dragon| 4RR").unwrap();
        assert_eq!(cleaned.display, "Shivan Dragon 4RR");

        let cleaned = clean_ocr_text("Jace, the Mind Sculptor 2").unwrap();
        assert_eq!(cleaned.display, "Jace, the Mind Sculptor");

        let cleaned = clean_ocr_text("- Yawgmoth's Will -").unwrap();
        assert_eq!(cleaned.display, "Yawgmoth's Will");

        assert!(clean_ocr_text("12 34").is_none());
        assert!(clean_ocr_text("").is_none());
        assert!(clean_ocr_text("a b").is_none());
    }

    #[test]
    fn test_normalize_confidence() {
        assert_eq!(normalize_confidence(72.5), 72.5);
        assert_eq!(normalize_confidence(-3.0), 0.0);
        assert_eq!(normalize_confidence(140.0), 100.0);
        assert_eq!(normalize_confidence(f32::NAN), 0.0);
        assert_eq!(normalize_confidence(f32::INFINITY), 0.0);
        assert_eq!(normalize_confidence(f32::NEG_INFINITY), 0.0);
    }

    #[test]
    fn test_zone_bounds() {
        assert_eq!(OcrZone::FullCard.bounds(600, 840), (0, 0, 600, 840));
        let (x, y, w, h) = OcrZone::TitleBar.bounds(600, 840);
        assert!(x + w <= 600 && y + h <= 840);
        assert!(h < 840 / 5);
        assert!(OcrZone::TitleBar.single_line());
        assert!(!OcrZone::FullCard.single_line());
    }

    #[tokio::test]
    async fn test_confident_title_skips_full_card() {
        let engine = Arc::new(ScriptedOcr::new(vec![output("Lightning Bolt", 91.0)]));
        let recognizer = TextRecognizer::new(engine.clone(), 50.0);

        let result = recognizer.recognize(&frame()).await.unwrap();
        assert_eq!(result.text, "Lightning Bolt");
        assert_eq!(result.zone, OcrZone::TitleBar);
        assert_eq!(result.readings.len(), 1);
        assert_eq!(*engine.calls.lock(), vec![true]);
    }

    #[tokio::test]
    async fn test_weak_title_falls_back_to_full_card() {
        let engine = Arc::new(ScriptedOcr::new(vec![
            output("Lightn1ng", 30.0),
            output("Lightning Bolt\nInstant", 72.0),
        ]));
        let recognizer = TextRecognizer::new(engine.clone(), 50.0);

        let result = recognizer.recognize(&frame()).await.unwrap();
        assert_eq!(result.zone, OcrZone::FullCard);
        assert_eq!(result.confidence, 72.0);
        assert_eq!(result.readings.len(), 2);
        assert_eq!(*engine.calls.lock(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_better_zone_wins() {
        let engine = Arc::new(ScriptedOcr::new(vec![
            output("Black Lotus", 45.0),
            output("Black Lotus", 20.0),
        ]));
        let recognizer = TextRecognizer::new(engine, 50.0);

        let result = recognizer.recognize(&frame()).await.unwrap();
        assert_eq!(result.zone, OcrZone::TitleBar);
        assert_eq!(result.confidence, 45.0);
    }

    #[tokio::test]
    async fn test_one_failing_zone_is_tolerated() {
        let engine = Arc::new(ScriptedOcr::new(vec![
            Err(anyhow!("engine crashed")),
            output("Black Lotus", 65.0),
        ]));
        let recognizer = TextRecognizer::new(engine, 50.0);

        let result = recognizer.recognize(&frame()).await.unwrap();
        assert_eq!(result.zone, OcrZone::FullCard);
        assert_eq!(result.readings.len(), 1);
    }

    #[tokio::test]
    async fn test_all_zones_failing_is_an_error() {
        let engine = Arc::new(ScriptedOcr::new(vec![
            Err(anyhow!("engine crashed")),
            Err(anyhow!("engine crashed again")),
        ]));
        let recognizer = TextRecognizer::new(engine, 50.0);
        assert!(recognizer.recognize(&frame()).await.is_err());
    }

    #[tokio::test]
    async fn test_no_text_returns_first_reading() {
        let engine = Arc::new(ScriptedOcr::new(vec![output("", 0.0), output("~~", 10.0)]));
        let recognizer = TextRecognizer::new(engine, 50.0);

        let result = recognizer.recognize(&frame()).await.unwrap();
        assert_eq!(result.zone, OcrZone::TitleBar);
        assert!(clean_ocr_text(&result.text).is_none());
    }
}
