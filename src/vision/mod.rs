//! Vision/OCR Layer
//!
//! Prepares captured card frames for text recognition and reads the printed
//! card name:
//! - Per-card-type enhancement presets and the enhancement pipeline
//! - Statistical card-type detection when no hint is given
//! - Local OCR capability and the multi-zone text recognition adapter
//! - Tesseract CLI backend

pub mod detect;
pub mod enhance;
pub mod ocr;
pub mod profiles;
pub mod tesseract;

pub use detect::{detect_card_type, FrameStats};
pub use enhance::{enhance, enhance_with_bounds, CanvasBounds};
pub use ocr::{clean_ocr_text, normalize_confidence, CleanedText, LocalOcr, OcrOutput, OcrZone, TextRecognition, TextRecognizer, ZoneReading};
pub use profiles::{CardType, DenoiseMode, EdgeMode, EnhancementProfile};
pub use tesseract::TesseractOcr;
