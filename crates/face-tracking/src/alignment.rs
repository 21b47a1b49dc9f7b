//! Guide alignment evaluation
//!
//! Decides whether the located face is the right size and fully inside the
//! guide, and only accepts alignment once that has held for several
//! consecutive ticks.

use std::collections::VecDeque;

use camera_capture::GuideGeometry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{AlignmentConfig, FaceDetection, LocatorOutput};

/// Guidance to surface to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Guidance {
    NoFace,
    MultipleFaces,
    CenterFace,
    MoveCloser,
    MoveFarther,
    Hold,
}

impl Guidance {
    pub fn message(&self) -> &'static str {
        match self {
            Guidance::NoFace => "No face detected. Look at the camera",
            Guidance::MultipleFaces => "Multiple faces detected. Only one person should be in view",
            Guidance::CenterFace => "Center your face inside the circle",
            Guidance::MoveCloser => "Move closer to the camera",
            Guidance::MoveFarther => "Move farther from the camera",
            Guidance::Hold => "Hold still",
        }
    }
}

/// Sliding window of fill ratio samples
#[derive(Debug, Clone)]
pub struct FillRatioWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl FillRatioWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, ratio: f32) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(ratio);
    }

    pub fn average(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f32>() / self.samples.len() as f32)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Result of one alignment evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentVerdict {
    pub guidance: Guidance,
    /// Smoothed fill ratio, when a face was measured
    pub fill_ratio: Option<f32>,
    pub size_ok: bool,
    pub contained: bool,
    /// Consecutive passing ticks so far
    pub consecutive: u32,
    /// Alignment has held for the required number of ticks
    pub accepted: bool,
    /// This tick is the one that reached the required count
    pub newly_accepted: bool,
}

impl AlignmentVerdict {
    fn rejected(guidance: Guidance) -> Self {
        Self {
            guidance,
            fill_ratio: None,
            size_ok: false,
            contained: false,
            consecutive: 0,
            accepted: false,
            newly_accepted: false,
        }
    }
}

/// Alignment evaluator with fill ratio smoothing and a consecutive-pass counter
#[derive(Debug, Clone)]
pub struct AlignmentEvaluator {
    config: AlignmentConfig,
    window: FillRatioWindow,
    consecutive: u32,
}

impl AlignmentEvaluator {
    pub fn new(config: AlignmentConfig) -> Self {
        Self {
            window: FillRatioWindow::new(config.window_size),
            config,
            consecutive: 0,
        }
    }

    /// Evaluate one locator pass against the guide
    pub fn evaluate(&mut self, output: &LocatorOutput, guide: &GuideGeometry) -> AlignmentVerdict {
        if self.faces_in_guide(output, guide) > 1 {
            self.consecutive = 0;
            debug!("Alignment reset: multiple faces in guide");
            return AlignmentVerdict::rejected(Guidance::MultipleFaces);
        }

        let Some(detection) = &output.primary else {
            self.consecutive = 0;
            return AlignmentVerdict::rejected(Guidance::NoFace);
        };

        let ratio = detection.face.height / guide.inner_diameter();
        self.window.push(ratio);
        let smoothed = self.window.average().unwrap_or(ratio);

        let size_ok = smoothed >= self.config.min_fill_ratio && smoothed <= self.config.max_fill_ratio;
        let contained = self.landmarks_contained(detection, guide);

        let guidance = if !contained {
            Guidance::CenterFace
        } else if smoothed < self.config.min_fill_ratio {
            Guidance::MoveCloser
        } else if smoothed > self.config.max_fill_ratio {
            Guidance::MoveFarther
        } else {
            Guidance::Hold
        };

        if size_ok && contained {
            self.consecutive = self.consecutive.saturating_add(1);
        } else {
            self.consecutive = 0;
        }

        let accepted = self.consecutive >= self.config.required_consecutive;
        AlignmentVerdict {
            guidance,
            fill_ratio: Some(smoothed),
            size_ok,
            contained,
            consecutive: self.consecutive,
            accepted,
            newly_accepted: self.consecutive == self.config.required_consecutive,
        }
    }

    /// Full reset (session restart)
    pub fn reset(&mut self) {
        self.consecutive = 0;
        self.window.clear();
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    fn faces_in_guide(&self, output: &LocatorOutput, guide: &GuideGeometry) -> usize {
        output
            .faces
            .iter()
            .filter(|f| {
                let (cx, cy) = f.center();
                guide.within_outer(cx, cy, self.config.multi_face_scale)
            })
            .count()
    }

    fn landmarks_contained(&self, detection: &FaceDetection, guide: &GuideGeometry) -> bool {
        detection
            .landmarks
            .points()
            .iter()
            .all(|&(x, y)| guide.within_outer(x, y, self.config.containment_scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FaceBox;
    use camera_capture::GuideConfig;

    fn guide() -> GuideGeometry {
        // 640x480: centre (320, 240), outer 216, inner 182.4 (diameter 364.8)
        GuideGeometry::from_dimensions(640, 480, &GuideConfig::default()).unwrap()
    }

    fn output_with(height: f32, cx: f32, cy: f32) -> LocatorOutput {
        let detection = FaceDetection::synthetic(cx, cy, height);
        LocatorOutput {
            faces: vec![detection.face],
            primary: Some(detection),
        }
    }

    #[test]
    fn test_window_is_bounded() {
        let mut window = FillRatioWindow::new(5);
        for v in [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7] {
            window.push(v);
        }
        assert_eq!(window.len(), 5);
        assert!((window.average().unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_accepted_after_three_ticks() {
        let mut eval = AlignmentEvaluator::new(AlignmentConfig::default());
        // 250 / 364.8 = 0.685
        let out = output_with(250.0, 320.0, 240.0);

        let first = eval.evaluate(&out, &guide());
        assert_eq!(first.guidance, Guidance::Hold);
        assert!(!first.accepted);
        assert!(!eval.evaluate(&out, &guide()).accepted);

        let third = eval.evaluate(&out, &guide());
        assert!(third.accepted);
        assert!(third.newly_accepted);

        let fourth = eval.evaluate(&out, &guide());
        assert!(fourth.accepted);
        assert!(!fourth.newly_accepted);
    }

    #[test]
    fn test_size_guidance() {
        let mut eval = AlignmentEvaluator::new(AlignmentConfig::default());
        let small = eval.evaluate(&output_with(120.0, 320.0, 240.0), &guide());
        assert_eq!(small.guidance, Guidance::MoveCloser);
        assert!(!small.size_ok);

        let mut eval = AlignmentEvaluator::new(AlignmentConfig::default());
        let large = eval.evaluate(&output_with(330.0, 320.0, 240.0), &guide());
        assert_eq!(large.guidance, Guidance::MoveFarther);
    }

    #[test]
    fn test_smoothing_delays_size_change() {
        let mut eval = AlignmentEvaluator::new(AlignmentConfig::default());
        for _ in 0..5 {
            eval.evaluate(&output_with(250.0, 320.0, 240.0), &guide());
        }
        // one small sample does not drag the average out of range
        let verdict = eval.evaluate(&output_with(150.0, 320.0, 240.0), &guide());
        assert!(verdict.size_ok);
    }

    #[test]
    fn test_landmark_outside_guide_fails_containment() {
        let mut eval = AlignmentEvaluator::new(AlignmentConfig::default());
        // Face centred far to the right: jaw points beyond 1.2 * 216 from centre
        let verdict = eval.evaluate(&output_with(250.0, 520.0, 240.0), &guide());
        assert!(!verdict.contained);
        assert_eq!(verdict.guidance, Guidance::CenterFace);
        assert_eq!(verdict.consecutive, 0);
    }

    #[test]
    fn test_single_failure_resets_counter() {
        let mut eval = AlignmentEvaluator::new(AlignmentConfig::default());
        let good = output_with(250.0, 320.0, 240.0);
        eval.evaluate(&good, &guide());
        eval.evaluate(&good, &guide());
        assert_eq!(eval.evaluate(&LocatorOutput::default(), &guide()).consecutive, 0);
        assert_eq!(eval.evaluate(&good, &guide()).consecutive, 1);
    }

    #[test]
    fn test_multiple_faces_reset() {
        let mut eval = AlignmentEvaluator::new(AlignmentConfig::default());
        let mut out = output_with(250.0, 320.0, 240.0);
        eval.evaluate(&out, &guide());
        out.faces.push(FaceBox { x: 380.0, y: 200.0, width: 80.0, height: 100.0, confidence: 0.9 });

        let verdict = eval.evaluate(&out, &guide());
        assert_eq!(verdict.guidance, Guidance::MultipleFaces);
        assert_eq!(eval.consecutive(), 0);
    }

    #[test]
    fn test_distant_second_face_ignored() {
        let mut eval = AlignmentEvaluator::new(AlignmentConfig::default());
        let mut out = output_with(250.0, 320.0, 240.0);
        // centre (5, 5) is ~390px from the guide centre, beyond 1.2 * 216
        out.faces.push(FaceBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0, confidence: 0.9 });
        assert_eq!(eval.evaluate(&out, &guide()).consecutive, 1);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn window_average_within_recent_samples(
                capacity in 1usize..10,
                values in prop::collection::vec(0.0f32..2.0, 1..50),
            ) {
                let mut window = FillRatioWindow::new(capacity);
                for v in &values {
                    window.push(*v);
                }
                prop_assert!(window.len() <= capacity);

                let recent = &values[values.len().saturating_sub(capacity)..];
                let lo = recent.iter().cloned().fold(f32::INFINITY, f32::min);
                let hi = recent.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
                let avg = window.average().unwrap();
                prop_assert!(avg >= lo - 1e-4 && avg <= hi + 1e-4);
            }
        }
    }
}
