//! Capture Layer
//!
//! Frames arrive from an external camera/capture collaborator or from image
//! files. This layer only owns the pixel container and its encodings.

pub mod frame;

pub use frame::CapturedFrame;
