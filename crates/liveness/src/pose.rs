//! Landmark-based head pose signals
//!
//! Neither signal is an angle. Yaw is the horizontal nose-tip offset from the
//! eye midpoint in units of inter-eye distance. The pitch ratio is the vertical
//! nose-tip offset from the eye midpoint over the eye-to-chin distance; it is
//! compared as a relative change against a baseline pose.

use face_tracking::Landmarks;
use serde::{Deserialize, Serialize};

use crate::ChallengeDirection;

const MIN_SPAN_PX: f32 = 1.0;

/// Raw pose signals for one sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    pub yaw: f32,
    pub pitch_ratio: f32,
}

impl PoseSample {
    /// None when the landmarks are too degenerate to normalize
    pub fn from_landmarks(landmarks: &Landmarks) -> Option<Self> {
        let (mx, my) = landmarks.eye_midpoint();
        let (nx, ny) = landmarks.nose_tip();
        let (_, chin_y) = landmarks.chin();

        let inter_eye = landmarks.inter_eye_distance();
        let eye_to_chin = chin_y - my;
        if inter_eye < MIN_SPAN_PX || eye_to_chin < MIN_SPAN_PX {
            return None;
        }

        Some(Self {
            yaw: (nx - mx) / inter_eye,
            pitch_ratio: (ny - my) / eye_to_chin,
        })
    }

    /// Signed displacement towards `direction` relative to `baseline`.
    ///
    /// Frames are unmirrored, so turning right moves the nose towards
    /// image-left (negative yaw).
    pub fn displacement(&self, baseline: &PoseSample, direction: ChallengeDirection) -> f32 {
        let yaw_delta = self.yaw - baseline.yaw;
        let pitch_delta = if baseline.pitch_ratio.abs() > f32::EPSILON {
            (self.pitch_ratio - baseline.pitch_ratio) / baseline.pitch_ratio.abs()
        } else {
            self.pitch_ratio - baseline.pitch_ratio
        };

        match direction {
            ChallengeDirection::Left => yaw_delta,
            ChallengeDirection::Right => -yaw_delta,
            ChallengeDirection::Down => pitch_delta,
            ChallengeDirection::Up => -pitch_delta,
        }
    }
}
