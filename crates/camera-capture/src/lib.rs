//! Camera Capture Library for Liveness Recording
//!
//! Provides the camera-facing side of the liveness pipeline:
//! - Decoded RGB frames and luminance helpers
//! - The `FrameSource` abstraction over a live camera track
//! - Capture health monitoring (resolution / frame rate warnings)
//! - Face guide geometry derived from the frame dimensions

pub mod frame;
pub mod guide;
pub mod source;

pub use frame::VideoFrame;
pub use guide::{FaceGuide, GuideConfig, GuideGeometry};
pub use source::{CaptureMonitor, CaptureRequirements, CaptureWarning, FrameSource, TrackCapabilities};

use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No camera device found")]
    NoDevice,

    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Capture timeout")]
    Timeout,

    #[error("Camera not initialized")]
    NotInitialized,
}

impl CameraError {
    /// Permission and device errors end the session; nothing is retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CameraError::PermissionDenied | CameraError::NoDevice | CameraError::Open(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(CameraError::PermissionDenied.is_fatal());
        assert!(CameraError::NoDevice.is_fatal());
        assert!(!CameraError::Timeout.is_fatal());
        assert!(!CameraError::Stream("glitch".into()).is_fatal());
    }
}
