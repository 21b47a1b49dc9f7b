//! Single challenge attempt
//!
//! Sampled every few hundred milliseconds. Crossing the near threshold asks
//! for the short clip to start so only the movement itself is recorded;
//! crossing the confirm threshold completes the attempt. Dropping back under
//! near before confirmation abandons the movement and its clip.
//!
//! Displacement is measured from a baseline pose taken at the first usable
//! sample. While no clip is running, moving against the requested direction
//! re-anchors the baseline, so the movement counts from the furthest point
//! reached on the opposite side.

use camera_capture::GuideGeometry;
use face_tracking::FaceDetection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Axis, ChallengeConfig, ChallengeDirection, PoseSample};

/// What the caller should do after a sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ChallengeStep {
    /// Nothing to do
    Waiting,
    /// Movement started: begin the short clip
    BeginClip,
    /// Movement abandoned: stop and discard the short clip
    AbandonClip,
    /// Direction confirmed; `with_clip` when the short clip is running
    Confirmed { with_clip: bool },
    /// Face left the guide while the clip was running
    Drifted,
    /// Attempt ran out of time
    TimedOut { with_clip: bool },
}

/// Tracks one attempt at one direction
#[derive(Debug, Clone)]
pub struct ChallengeTracker {
    direction: ChallengeDirection,
    near: f32,
    confirm: f32,
    started_at_ms: u64,
    timeout_ms: u64,
    baseline: Option<PoseSample>,
    clip_active: bool,
    finished: bool,
}

impl ChallengeTracker {
    pub fn new(direction: ChallengeDirection, config: &ChallengeConfig, now_ms: u64) -> Self {
        let (near, confirm) = match direction.axis() {
            Axis::Yaw => (config.yaw_near, config.yaw_confirm),
            Axis::Pitch => (config.pitch_near, config.pitch_confirm),
        };
        Self {
            direction,
            near,
            confirm,
            started_at_ms: now_ms,
            timeout_ms: config.timeout_ms,
            baseline: None,
            clip_active: false,
            finished: false,
        }
    }

    pub fn direction(&self) -> ChallengeDirection {
        self.direction
    }

    pub fn clip_active(&self) -> bool {
        self.clip_active
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.started_at_ms) >= self.timeout_ms
    }

    /// Evaluate one sample. `detection` is the primary face, if any.
    pub fn sample(
        &mut self,
        now_ms: u64,
        detection: Option<&FaceDetection>,
        guide: &GuideGeometry,
    ) -> ChallengeStep {
        if self.finished {
            return ChallengeStep::Waiting;
        }
        if self.is_expired(now_ms) {
            return self.time_out();
        }

        let Some(detection) = detection else {
            return ChallengeStep::Waiting;
        };

        let (cx, cy) = detection.face.center();
        if self.clip_active && !guide.within_outer(cx, cy, 1.0) {
            debug!("Face left the guide during {:?} challenge", self.direction);
            self.clip_active = false;
            self.finished = true;
            return ChallengeStep::Drifted;
        }

        let Some(pose) = PoseSample::from_landmarks(&detection.landmarks) else {
            return ChallengeStep::Waiting;
        };
        let Some(baseline) = self.baseline else {
            self.baseline = Some(pose);
            return ChallengeStep::Waiting;
        };

        let displacement = pose.displacement(&baseline, self.direction);
        if displacement < 0.0 && !self.clip_active {
            self.baseline = Some(pose);
            return ChallengeStep::Waiting;
        }

        if displacement >= self.confirm {
            info!(
                "Challenge {:?} confirmed (displacement {:.3})",
                self.direction, displacement
            );
            let with_clip = self.clip_active;
            self.clip_active = false;
            self.finished = true;
            return ChallengeStep::Confirmed { with_clip };
        }

        if displacement >= self.near && !self.clip_active {
            self.clip_active = true;
            return ChallengeStep::BeginClip;
        }

        if displacement < self.near && self.clip_active {
            debug!("Challenge {:?} movement abandoned", self.direction);
            self.clip_active = false;
            return ChallengeStep::AbandonClip;
        }

        ChallengeStep::Waiting
    }

    /// Force the attempt to end unsuccessfully
    pub fn time_out(&mut self) -> ChallengeStep {
        let with_clip = self.clip_active;
        self.clip_active = false;
        self.finished = true;
        info!("Challenge {:?} timed out", self.direction);
        ChallengeStep::TimedOut { with_clip }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::GuideConfig;

    fn guide() -> GuideGeometry {
        GuideGeometry::from_dimensions(640, 480, &GuideConfig::default()).unwrap()
    }

    /// Frontal face at the guide centre with the nose displaced
    fn face(dx: f32, dy: f32) -> FaceDetection {
        let mut d = FaceDetection::synthetic(320.0, 240.0, 250.0);
        d.landmarks = d.landmarks.with_nose_offset(dx, dy);
        d
    }

    // For a 250px face: eye-to-chin = 0.25*125 + 0.81*125 = 132.5,
    // baseline pitch ratio = 0.35*125 / 132.5 = 0.3302.
    fn nose_dy_for_pitch_change(change: f32) -> f32 {
        change * 0.35 * 125.0
    }

    #[test]
    fn test_down_confirms_only_past_confirm_threshold() {
        let config = ChallengeConfig::default();
        let mut tracker = ChallengeTracker::new(ChallengeDirection::Down, &config, 0);
        let g = guide();

        assert_eq!(tracker.sample(0, Some(&face(0.0, 0.0)), &g), ChallengeStep::Waiting);
        assert_eq!(
            tracker.sample(150, Some(&face(0.0, nose_dy_for_pitch_change(0.30))), &g),
            ChallengeStep::BeginClip
        );
        assert_eq!(
            tracker.sample(300, Some(&face(0.0, nose_dy_for_pitch_change(0.35))), &g),
            ChallengeStep::Waiting
        );
        assert!(!tracker.is_finished());
        assert_eq!(
            tracker.sample(450, Some(&face(0.0, nose_dy_for_pitch_change(0.40))), &g),
            ChallengeStep::Confirmed { with_clip: true }
        );
        assert!(tracker.is_finished());
    }

    #[test]
    fn test_abandoned_movement_stops_clip() {
        let config = ChallengeConfig::default();
        let mut tracker = ChallengeTracker::new(ChallengeDirection::Left, &config, 0);
        let g = guide();
        // inter-eye distance 87.5px
        tracker.sample(0, Some(&face(0.0, 0.0)), &g);
        assert_eq!(tracker.sample(150, Some(&face(15.0, 0.0)), &g), ChallengeStep::BeginClip);
        assert_eq!(tracker.sample(300, Some(&face(2.0, 0.0)), &g), ChallengeStep::AbandonClip);
        assert!(!tracker.clip_active());
        assert!(!tracker.is_finished());
    }

    #[test]
    fn test_jump_straight_to_confirm_has_no_clip() {
        let config = ChallengeConfig::default();
        let mut tracker = ChallengeTracker::new(ChallengeDirection::Right, &config, 0);
        let g = guide();
        tracker.sample(0, Some(&face(0.0, 0.0)), &g);
        assert_eq!(
            tracker.sample(150, Some(&face(-30.0, 0.0)), &g),
            ChallengeStep::Confirmed { with_clip: false }
        );
    }

    #[test]
    fn test_wrong_direction_never_confirms() {
        let config = ChallengeConfig::default();
        let mut tracker = ChallengeTracker::new(ChallengeDirection::Right, &config, 0);
        let g = guide();
        tracker.sample(0, Some(&face(0.0, 0.0)), &g);
        for i in 1..10 {
            assert_eq!(tracker.sample(i * 150, Some(&face(40.0, 0.0)), &g), ChallengeStep::Waiting);
        }
    }

    #[test]
    fn test_baseline_follows_opposite_movement() {
        let config = ChallengeConfig::default();
        let mut tracker = ChallengeTracker::new(ChallengeDirection::Left, &config, 0);
        let g = guide();
        // already turned left when the attempt began
        tracker.sample(0, Some(&face(20.0, 0.0)), &g);
        assert_eq!(tracker.sample(150, Some(&face(-10.0, 0.0)), &g), ChallengeStep::Waiting);
        // 25px from the re-anchored baseline: 25 / 87.5 = 0.286
        assert_eq!(
            tracker.sample(300, Some(&face(15.0, 0.0)), &g),
            ChallengeStep::Confirmed { with_clip: false }
        );
    }

    #[test]
    fn test_drift_with_clip_fails() {
        let config = ChallengeConfig::default();
        let mut tracker = ChallengeTracker::new(ChallengeDirection::Left, &config, 0);
        let g = guide();
        tracker.sample(0, Some(&face(0.0, 0.0)), &g);
        tracker.sample(150, Some(&face(15.0, 0.0)), &g);

        let mut moved = FaceDetection::synthetic(600.0, 240.0, 250.0);
        moved.landmarks = moved.landmarks.with_nose_offset(15.0, 0.0);
        assert_eq!(tracker.sample(300, Some(&moved), &g), ChallengeStep::Drifted);
        assert!(tracker.is_finished());
    }

    #[test]
    fn test_timeout() {
        let config = ChallengeConfig::default();
        let mut tracker = ChallengeTracker::new(ChallengeDirection::Up, &config, 1_000);
        let g = guide();
        tracker.sample(1_000, Some(&face(0.0, 0.0)), &g);
        assert!(!tracker.is_expired(30_999));
        assert_eq!(
            tracker.sample(31_000, Some(&face(0.0, 0.0)), &g),
            ChallengeStep::TimedOut { with_clip: false }
        );
    }

    #[test]
    fn test_missing_face_waits() {
        let config = ChallengeConfig::default();
        let mut tracker = ChallengeTracker::new(ChallengeDirection::Up, &config, 0);
        assert_eq!(tracker.sample(150, None, &guide()), ChallengeStep::Waiting);
    }
}
