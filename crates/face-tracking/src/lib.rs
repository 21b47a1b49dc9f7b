//! Face Tracking
//!
//! Consumes the output of an external face locator:
//! - Face boxes, 68-point landmarks and descriptors
//! - Guide alignment (fill ratio smoothing, containment, multi-face rejection)
//! - Identity consistency against a per-session reference descriptor

pub mod alignment;
pub mod config;
pub mod detector;
pub mod identity;

pub use alignment::{AlignmentEvaluator, AlignmentVerdict, FillRatioWindow, Guidance};
pub use config::{AlignmentConfig, IdentityConfig};
pub use detector::{
    Descriptor, FaceBox, FaceDetection, FaceLocator, Landmarks, LocatorOutput, LANDMARK_COUNT,
};
pub use identity::{IdentityChecker, IdentityVerdict};

use thiserror::Error;

/// Face tracking error types
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Expected 68 landmarks, got {0}")]
    LandmarkCount(usize),

    #[error("Face detection failed: {0}")]
    Detection(String),

    #[error("Descriptor extraction failed: {0}")]
    Descriptor(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
