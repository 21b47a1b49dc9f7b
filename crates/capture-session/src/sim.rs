//! Simulation doubles
//!
//! A textured synthetic camera and a face locator that keeps one face in the
//! guide while sweeping the head left, right, up and down on a fixed cycle.
//! Together they let a complete session run without a camera or a model.

use camera_capture::{CameraError, FrameSource, GuideConfig, GuideGeometry, TrackCapabilities, VideoFrame};
use face_tracking::{Descriptor, FaceBox, FaceDetection, FaceLocator, TrackingError};
use tokio::time::Instant;

const NANOS_PER_MS: u64 = 1_000_000;

/// Camera producing a striped mid-grey texture at a fixed frame rate
pub struct SyntheticCamera {
    template: VideoFrame,
    frame_interval_ns: u64,
    frame_limit: Option<u32>,
    started: Option<Instant>,
    next_due_ns: u64,
    sequence: u32,
    active: bool,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32, fps: f32) -> Self {
        let mut template = VideoFrame::filled(width, height, [60, 60, 60]);
        for y in 0..height {
            for x in 0..width {
                if (x / 8 + y / 8) % 2 == 0 {
                    template.set_pixel(x, y, [180, 180, 180]);
                }
            }
        }
        Self {
            template,
            frame_interval_ns: (1e9 / fps.max(1.0)) as u64,
            frame_limit: None,
            started: None,
            next_due_ns: 0,
            sequence: 0,
            active: true,
        }
    }

    /// Stop delivering after `frames` frames
    pub fn with_frame_limit(mut self, frames: u32) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    pub fn frames_delivered(&self) -> u32 {
        self.sequence
    }
}

impl FrameSource for SyntheticCamera {
    fn is_active(&self) -> bool {
        self.active
    }

    fn capabilities(&self) -> TrackCapabilities {
        TrackCapabilities {
            width: self.template.width,
            height: self.template.height,
            frame_rate: Some(1e9 / self.frame_interval_ns as f32),
        }
    }

    fn current_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if !self.active {
            return Err(CameraError::NotInitialized);
        }
        if self.frame_limit.is_some_and(|limit| self.sequence >= limit) {
            self.active = false;
            return Ok(None);
        }

        let started = *self.started.get_or_insert_with(Instant::now);
        let elapsed_ns = started.elapsed().as_nanos() as u64;
        if elapsed_ns < self.next_due_ns {
            return Ok(None);
        }
        self.next_due_ns = elapsed_ns + self.frame_interval_ns;

        let mut frame = self.template.clone();
        frame.timestamp_ns = elapsed_ns;
        frame.sequence = self.sequence;
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn stop(&mut self) {
        self.active = false;
    }
}

/// Head sweep timing within one direction window (milliseconds)
const RAMP_MS: u64 = 300;
const HOLD_MS: u64 = 200;
const WINDOW_MS: u64 = 1_000;
const SWEEP_ORDER: [(f32, f32); 4] = [(1.0, 0.0), (-1.0, 0.0), (0.0, -1.0), (0.0, 1.0)];

/// Face locator that sweeps one centred face through every direction
pub struct SweepingLocator {
    guide: GuideConfig,
    fill_ratio: f32,
    yaw_amplitude: f32,
    pitch_amplitude: f32,
    descriptor: Descriptor,
    /// Frame time window (ms) with no face
    dropout: Option<(u64, u64)>,
}

impl SweepingLocator {
    pub fn new(guide: GuideConfig) -> Self {
        Self {
            guide,
            fill_ratio: 0.68,
            yaw_amplitude: 0.4,
            pitch_amplitude: 0.6,
            descriptor: Descriptor::new(vec![0.1; 128]),
            dropout: None,
        }
    }

    /// Hide the face between `from_ms` and `to_ms` of frame time
    pub fn with_dropout(mut self, from_ms: u64, to_ms: u64) -> Self {
        self.dropout = Some((from_ms, to_ms));
        self
    }

    /// Sweep weight in [0, 1] and direction at frame time `t_ms`
    fn sweep(t_ms: u64) -> ((f32, f32), f32) {
        let window = ((t_ms / WINDOW_MS) % SWEEP_ORDER.len() as u64) as usize;
        let offset = t_ms % WINDOW_MS;
        let weight = if offset < RAMP_MS {
            offset as f32 / RAMP_MS as f32
        } else if offset < RAMP_MS + HOLD_MS {
            1.0
        } else if offset < 2 * RAMP_MS + HOLD_MS {
            1.0 - (offset - RAMP_MS - HOLD_MS) as f32 / RAMP_MS as f32
        } else {
            0.0
        };
        (SWEEP_ORDER[window], weight)
    }

    fn detection(&self, frame: &VideoFrame) -> Option<FaceDetection> {
        let t_ms = frame.timestamp_ns / NANOS_PER_MS;
        if let Some((from, to)) = self.dropout {
            if t_ms >= from && t_ms < to {
                return None;
            }
        }
        let guide = GuideGeometry::from_dimensions(frame.width, frame.height, &self.guide)?;
        let height = self.fill_ratio * guide.inner_diameter();
        let mut detection = FaceDetection::synthetic(guide.center_x, guide.center_y, height);

        let ((sx, sy), weight) = Self::sweep(t_ms);
        let landmarks = &detection.landmarks;
        let (_, eye_y) = landmarks.eye_midpoint();
        let (_, nose_y) = landmarks.nose_tip();
        let dx = sx * weight * self.yaw_amplitude * landmarks.inter_eye_distance();
        let dy = sy * weight * self.pitch_amplitude * (nose_y - eye_y);
        detection.landmarks = detection.landmarks.with_nose_offset(dx, dy);
        Some(detection)
    }
}

impl FaceLocator for SweepingLocator {
    fn locate_faces(&mut self, frame: &VideoFrame) -> Result<Vec<FaceBox>, TrackingError> {
        Ok(self.detection(frame).map(|d| d.face).into_iter().collect())
    }

    fn locate_primary(&mut self, frame: &VideoFrame) -> Result<Option<FaceDetection>, TrackingError> {
        Ok(self.detection(frame))
    }

    fn describe(&mut self, frame: &VideoFrame) -> Result<Option<Descriptor>, TrackingError> {
        Ok(self.detection(frame).map(|_| self.descriptor.clone()))
    }
}
