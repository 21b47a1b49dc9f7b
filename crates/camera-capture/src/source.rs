//! Frame source abstraction and capture health monitoring

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{CameraError, VideoFrame};

/// Capability metadata reported by the camera track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackCapabilities {
    pub width: u32,
    pub height: u32,
    /// Nominal frame rate, when the track advertises one
    pub frame_rate: Option<f32>,
}

/// A live camera track
pub trait FrameSource: Send {
    /// Whether the stream is still delivering frames
    fn is_active(&self) -> bool;

    /// Track capability metadata
    fn capabilities(&self) -> TrackCapabilities;

    /// Latest frame, or `None` when no new frame is ready yet
    fn current_frame(&mut self) -> Result<Option<VideoFrame>, CameraError>;

    /// Release the device. Stopping is a hard stop for the whole session.
    fn stop(&mut self);
}

/// Minimum capture quality the pipeline expects
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureRequirements {
    pub min_width: u32,
    pub min_height: u32,
    pub min_fps: f32,
    /// Frame rate sampling window (milliseconds)
    pub fps_window_ms: u64,
}

impl Default for CaptureRequirements {
    fn default() -> Self {
        Self {
            min_width: 400,
            min_height: 300,
            min_fps: 15.0,
            fps_window_ms: 1000,
        }
    }
}

/// Non-fatal capture warnings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CaptureWarning {
    LowResolution { width: u32, height: u32 },
    LowFrameRate { fps: f32 },
}

impl CaptureWarning {
    pub fn message(&self) -> String {
        match self {
            CaptureWarning::LowResolution { width, height } => {
                format!("Camera resolution {}x{} is below the recommended minimum", width, height)
            }
            CaptureWarning::LowFrameRate { fps } => {
                format!("Camera frame rate is low ({:.1} fps)", fps)
            }
        }
    }
}

/// Tracks resolution and measured frame rate of the incoming stream.
///
/// Warnings never halt capture; callers decide what to do with them.
#[derive(Debug, Clone)]
pub struct CaptureMonitor {
    requirements: CaptureRequirements,
    window_start_ns: Option<u64>,
    frames_in_window: u32,
    measured_fps: Option<f32>,
}

impl CaptureMonitor {
    pub fn new(requirements: CaptureRequirements) -> Self {
        Self {
            requirements,
            window_start_ns: None,
            frames_in_window: 0,
            measured_fps: None,
        }
    }

    /// Check advertised track resolution
    pub fn check_capabilities(&self, caps: &TrackCapabilities) -> Option<CaptureWarning> {
        if caps.width < self.requirements.min_width || caps.height < self.requirements.min_height {
            warn!(
                "Capture resolution {}x{} below {}x{}",
                caps.width, caps.height, self.requirements.min_width, self.requirements.min_height
            );
            return Some(CaptureWarning::LowResolution {
                width: caps.width,
                height: caps.height,
            });
        }
        None
    }

    /// Count a frame. Returns a warning when a sampling window closes below the minimum rate.
    pub fn record_frame(&mut self, timestamp_ns: u64) -> Option<CaptureWarning> {
        let start = match self.window_start_ns {
            Some(start) if timestamp_ns >= start => start,
            _ => {
                self.window_start_ns = Some(timestamp_ns);
                self.frames_in_window = 1;
                return None;
            }
        };

        self.frames_in_window += 1;
        let elapsed_ns = timestamp_ns - start;
        let window_ns = self.requirements.fps_window_ms * 1_000_000;
        if elapsed_ns < window_ns {
            return None;
        }

        // Frames after the first one span the elapsed interval
        let fps = (self.frames_in_window - 1) as f32 * 1e9 / elapsed_ns as f32;
        self.measured_fps = Some(fps);
        self.window_start_ns = Some(timestamp_ns);
        self.frames_in_window = 1;

        if fps < self.requirements.min_fps {
            warn!("Measured frame rate {:.1} fps below {:.1}", fps, self.requirements.min_fps);
            Some(CaptureWarning::LowFrameRate { fps })
        } else {
            None
        }
    }

    /// Frame rate from the last completed window
    pub fn measured_fps(&self) -> Option<f32> {
        self.measured_fps
    }

    pub fn low_frame_rate(&self) -> bool {
        self.measured_fps
            .map(|fps| fps < self.requirements.min_fps)
            .unwrap_or(false)
    }
}
