//! Error taxonomy for the recognition pipeline
//!
//! Catalog build failures surface to the caller. Recognition failures never
//! escape the arbitrator: they advance its state machine and, at worst, end up
//! as the reason carried by a `NoMatch` result.

use thiserror::Error;

/// Errors raised while building the card catalog index
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The backing record list was empty; the catalog is "not ready" yet
    #[error("catalog is empty, no card records were supplied")]
    EmptyCatalog,
}

/// Errors raised by the image enhancement pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnhancementError {
    /// Card-type tag with no enhancement preset
    #[error("unsupported enhancement profile: {0}")]
    UnsupportedProfile(String),

    /// Frame buffer does not describe a usable image
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Per-attempt recognition failures
///
/// Also used as the reason code of a `NoMatch` result, so every variant renders
/// an actionable message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecognitionError {
    #[error("remote vision service is unavailable (health probe failed)")]
    RemoteUnavailable,

    #[error("remote vision could not read the card clearly: {0}")]
    RemoteUnclear(String),

    #[error("remote vision timed out after {0} ms")]
    RemoteTimeout(u64),

    #[error("remote vision request failed: {0}")]
    RemoteTransport(String),

    #[error("local OCR timed out after {0} ms")]
    LocalTimeout(u64),

    #[error("local OCR confidence too low ({confidence:.0}), hold the card steady in good light")]
    LocalLowConfidence { confidence: f32 },

    #[error("local OCR read no usable text from the card title")]
    LocalNoText,

    #[error("no catalog card resembles the text read: \"{0}\"")]
    NoCatalogMatch(String),

    #[error("local OCR engine failed: {0}")]
    LocalEngine(String),

    #[error("captured frame could not be processed: {0}")]
    InvalidFrame(String),
}

impl RecognitionError {
    /// Rank used to select the NoMatch reason (lower wins)
    pub fn priority(&self) -> u8 {
        match self {
            RecognitionError::RemoteUnavailable => 0,
            RecognitionError::RemoteUnclear(_) => 1,
            RecognitionError::RemoteTimeout(_) => 2,
            RecognitionError::RemoteTransport(_) => 3,
            RecognitionError::LocalTimeout(_) => 4,
            RecognitionError::LocalLowConfidence { .. } => 5,
            RecognitionError::NoCatalogMatch(_) => 6,
            RecognitionError::LocalNoText => 7,
            RecognitionError::LocalEngine(_) => 8,
            RecognitionError::InvalidFrame(_) => 9,
        }
    }

    /// Short machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            RecognitionError::RemoteUnavailable => "remote_unavailable",
            RecognitionError::RemoteUnclear(_) => "remote_unclear",
            RecognitionError::RemoteTimeout(_) => "remote_timeout",
            RecognitionError::RemoteTransport(_) => "remote_transport",
            RecognitionError::LocalTimeout(_) => "local_timeout",
            RecognitionError::LocalLowConfidence { .. } => "local_low_confidence",
            RecognitionError::LocalNoText => "local_no_text",
            RecognitionError::NoCatalogMatch(_) => "no_catalog_match",
            RecognitionError::LocalEngine(_) => "local_engine",
            RecognitionError::InvalidFrame(_) => "invalid_frame",
        }
    }

    /// Whether the failure came from the remote-vision path
    pub fn is_remote(&self) -> bool {
        self.priority() <= 3
    }
}
