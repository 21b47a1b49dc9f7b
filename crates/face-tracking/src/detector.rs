//! Face locator interface and detection types

use camera_capture::VideoFrame;
use serde::{Deserialize, Serialize};

use crate::TrackingError;

/// Number of points in the iBUG 68-point landmark layout
pub const LANDMARK_COUNT: usize = 68;

const CHIN: usize = 8;
const NOSE_TIP: usize = 30;
const LEFT_EYE: std::ops::RangeInclusive<usize> = 36..=41;
const RIGHT_EYE: std::ops::RangeInclusive<usize> = 42..=47;

/// Face bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// 68-point facial landmarks in frame pixel coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f32, f32)>", into = "Vec<(f32, f32)>")]
pub struct Landmarks {
    points: Vec<(f32, f32)>,
}

impl Landmarks {
    pub fn new(points: Vec<(f32, f32)>) -> Result<Self, TrackingError> {
        if points.len() != LANDMARK_COUNT {
            return Err(TrackingError::LandmarkCount(points.len()));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[(f32, f32)] {
        &self.points
    }

    pub fn nose_tip(&self) -> (f32, f32) {
        self.points[NOSE_TIP]
    }

    pub fn chin(&self) -> (f32, f32) {
        self.points[CHIN]
    }

    pub fn left_eye_center(&self) -> (f32, f32) {
        mean_point(&self.points[LEFT_EYE])
    }

    pub fn right_eye_center(&self) -> (f32, f32) {
        mean_point(&self.points[RIGHT_EYE])
    }

    pub fn eye_midpoint(&self) -> (f32, f32) {
        let (lx, ly) = self.left_eye_center();
        let (rx, ry) = self.right_eye_center();
        ((lx + rx) / 2.0, (ly + ry) / 2.0)
    }

    pub fn inter_eye_distance(&self) -> f32 {
        let (lx, ly) = self.left_eye_center();
        let (rx, ry) = self.right_eye_center();
        ((rx - lx).powi(2) + (ry - ly).powi(2)).sqrt()
    }

    /// Frontal layout centred at (cx, cy) for a face of the given height.
    ///
    /// Used by simulated locators; real locators return model output.
    pub fn synthetic_frontal(cx: f32, cy: f32, face_height: f32) -> Self {
        let s = face_height / 2.0;
        let mut points = vec![(cx, cy); LANDMARK_COUNT];
        // jaw line from temple to temple, chin at index 8
        for (i, p) in points.iter_mut().enumerate().take(17) {
            let t = i as f32 / 16.0 * std::f32::consts::PI;
            *p = (cx - 0.8 * s * t.cos(), cy + 0.81 * s * t.sin());
        }
        for p in &mut points[LEFT_EYE] {
            *p = (cx - 0.35 * s, cy - 0.25 * s);
        }
        for p in &mut points[RIGHT_EYE] {
            *p = (cx + 0.35 * s, cy - 0.25 * s);
        }
        points[NOSE_TIP] = (cx, cy + 0.1 * s);
        Self { points }
    }

    /// Move the nose tip by (dx, dy), as a head turn or tilt would
    pub fn with_nose_offset(&self, dx: f32, dy: f32) -> Self {
        let mut points = self.points.clone();
        let (x, y) = points[NOSE_TIP];
        points[NOSE_TIP] = (x + dx, y + dy);
        Self { points }
    }
}

impl TryFrom<Vec<(f32, f32)>> for Landmarks {
    type Error = TrackingError;

    fn try_from(points: Vec<(f32, f32)>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<Landmarks> for Vec<(f32, f32)> {
    fn from(landmarks: Landmarks) -> Self {
        landmarks.points
    }
}

fn mean_point(points: &[(f32, f32)]) -> (f32, f32) {
    let n = points.len().max(1) as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
    (sx / n, sy / n)
}

/// Primary face with landmarks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub face: FaceBox,
    pub landmarks: Landmarks,
}

impl FaceDetection {
    /// Synthetic frontal face centred at (cx, cy)
    pub fn synthetic(cx: f32, cy: f32, face_height: f32) -> Self {
        Self {
            face: FaceBox {
                x: cx - face_height * 0.4,
                y: cy - face_height / 2.0,
                width: face_height * 0.8,
                height: face_height,
                confidence: 0.98,
            },
            landmarks: Landmarks::synthetic_frontal(cx, cy, face_height),
        }
    }
}

/// Face descriptor (embedding)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub vector: Vec<f32>,
}

impl Descriptor {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }

    /// Euclidean distance; mismatched lengths are maximally distant
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        if self.vector.len() != other.vector.len() {
            return f32::INFINITY;
        }
        self.vector
            .iter()
            .zip(other.vector.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }
}

/// Combined output of one locator pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocatorOutput {
    /// Every face found in the full frame
    pub faces: Vec<FaceBox>,
    /// Primary face with landmarks
    pub primary: Option<FaceDetection>,
}

/// External face detection / landmark / descriptor capability.
///
/// Every call may legitimately report "no face".
pub trait FaceLocator: Send {
    /// Boxes for every face in the frame
    fn locate_faces(&mut self, frame: &VideoFrame) -> Result<Vec<FaceBox>, TrackingError>;

    /// Single most prominent face with its landmarks
    fn locate_primary(&mut self, frame: &VideoFrame) -> Result<Option<FaceDetection>, TrackingError>;

    /// Descriptor of the primary face
    fn describe(&mut self, frame: &VideoFrame) -> Result<Option<Descriptor>, TrackingError>;

    /// Distance between two descriptors
    fn distance(&self, a: &Descriptor, b: &Descriptor) -> f32 {
        a.euclidean_distance(b)
    }

    /// Run the multi-face pass then the primary pass
    fn locate(&mut self, frame: &VideoFrame) -> Result<LocatorOutput, TrackingError> {
        let faces = self.locate_faces(frame)?;
        let primary = self.locate_primary(frame)?;
        Ok(LocatorOutput { faces, primary })
    }
}
