//! Card Scanner - trading card name recognition
//!
//! Identifies a card's printed name from a photo by arbitrating between a
//! remote vision service and local OCR matched against an offline catalog.

pub mod capture;
pub mod catalog;
pub mod config;
pub mod error;
pub mod recognition;
pub mod scanner;
pub mod storage;
pub mod vision;

pub use capture::CapturedFrame;
pub use catalog::{CardRecord, CatalogIndex, CatalogStore, MatchCandidate, MatchType, SearchField};
pub use config::AppConfig;
pub use error::{CatalogError, EnhancementError, RecognitionError};
pub use recognition::{RecognitionAttempt, RecognitionMethod, RecognitionOutcome, RecognitionResult};
pub use scanner::CardScanner;
pub use vision::CardType;
