//! Recognition Layer
//!
//! Arbitrates between a remote vision service and the local OCR + fuzzy
//! catalog path, and reports one determinate result per scan.

pub mod arbitrator;
pub mod cache;
pub mod cooldown;
pub mod remote;

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::catalog::CardRecord;
use crate::error::RecognitionError;
use crate::vision::CardType;

pub use arbitrator::{Arbitrator, ArbitratorConfig};
pub use cache::RemoteCache;
pub use cooldown::CooldownGate;
pub use remote::{HttpVisionClient, RemoteVision, RemoteVisionResponse};

/// Remote results at or above this confidence are accepted outright
pub const REMOTE_CONFIDENCE_THRESHOLD: f32 = 90.0;
/// Local OCR results at or above this confidence are accepted as a fallback
pub const LOCAL_CONFIDENCE_THRESHOLD: f32 = 50.0;
/// Minimum fuzzy similarity for an OCR read to resolve to a catalog card
pub const FUZZY_MIN_SIMILARITY: f32 = 0.4;
/// Minimum interval between two remote vision calls
pub const REMOTE_COOLDOWN_MS: u64 = 2000;

/// Which path produced a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionMethod {
    RemoteVision,
    LocalOcr,
}

impl fmt::Display for RecognitionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionMethod::RemoteVision => f.write_str("remote_vision"),
            RecognitionMethod::LocalOcr => f.write_str("local_ocr"),
        }
    }
}

/// States a scan passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    AttemptRemote,
    AttemptLocal,
    Resolved,
}

/// Outcome of one remote or local call
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionAttempt {
    pub method: RecognitionMethod,
    pub success: bool,
    pub raw_text: String,
    /// Confidence reported by the service or engine (0 - 100)
    pub confidence: f32,
    pub elapsed_ms: u64,
    pub failure_reason: Option<RecognitionError>,
    /// Served from the remote result cache without a call
    pub cached: bool,
}

impl RecognitionAttempt {
    pub(crate) fn succeeded(method: RecognitionMethod, raw_text: String, confidence: f32, elapsed_ms: u64) -> Self {
        Self {
            method,
            success: true,
            raw_text,
            confidence,
            elapsed_ms,
            failure_reason: None,
            cached: false,
        }
    }

    pub(crate) fn failed(
        method: RecognitionMethod,
        reason: RecognitionError,
        raw_text: String,
        confidence: f32,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            method,
            success: false,
            raw_text,
            confidence,
            elapsed_ms,
            failure_reason: Some(reason),
            cached: false,
        }
    }
}

/// Final arbitrated answer
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionOutcome {
    Match {
        card_name: String,
        /// Confidence of the winning path's own engine (0 - 100)
        confidence: f32,
        method: RecognitionMethod,
        /// Fuzzy-match similarity of the catalog lookup, reported separately
        match_similarity: Option<f32>,
        /// Catalog record the name resolved to, if any
        card: Option<Arc<CardRecord>>,
    },
    NoMatch {
        reason: RecognitionError,
        diagnostic: String,
    },
}

/// Result of one scan call, created fresh per call
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub outcome: RecognitionOutcome,
    pub processing_time_ms: u64,
    /// Card type whose enhancement preset was used
    pub card_type: CardType,
    /// Attempts in the order they were made
    pub attempts: Vec<RecognitionAttempt>,
    /// States visited, ending in `Resolved`
    pub states: Vec<ScanState>,
}

impl RecognitionResult {
    pub fn is_match(&self) -> bool {
        matches!(self.outcome, RecognitionOutcome::Match { .. })
    }

    pub fn card_name(&self) -> Option<&str> {
        match &self.outcome {
            RecognitionOutcome::Match { card_name, .. } => Some(card_name),
            RecognitionOutcome::NoMatch { .. } => None,
        }
    }

    pub fn method(&self) -> Option<RecognitionMethod> {
        match &self.outcome {
            RecognitionOutcome::Match { method, .. } => Some(*method),
            RecognitionOutcome::NoMatch { .. } => None,
        }
    }

    pub fn confidence(&self) -> Option<f32> {
        match &self.outcome {
            RecognitionOutcome::Match { confidence, .. } => Some(*confidence),
            RecognitionOutcome::NoMatch { .. } => None,
        }
    }

    pub fn no_match_reason(&self) -> Option<&RecognitionError> {
        match &self.outcome {
            RecognitionOutcome::Match { .. } => None,
            RecognitionOutcome::NoMatch { reason, .. } => Some(reason),
        }
    }

    /// Number of attempts made through `method` (cache hits included)
    pub fn attempts_by(&self, method: RecognitionMethod) -> usize {
        self.attempts.iter().filter(|a| a.method == method).count()
    }
}
