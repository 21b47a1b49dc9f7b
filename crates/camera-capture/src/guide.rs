//! Face guide geometry
//!
//! The guide is a pair of concentric circles centred on the frame. The inner
//! circle is the alignment target the face should fill; the outer circle bounds
//! where the face (and every landmark) may sit.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Guide proportions relative to the shorter frame side
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuideConfig {
    pub outer_radius_ratio: f32,
    pub inner_radius_ratio: f32,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            outer_radius_ratio: 0.45,
            inner_radius_ratio: 0.38,
        }
    }
}

/// Guide circles in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuideGeometry {
    pub center_x: f32,
    pub center_y: f32,
    pub outer_radius: f32,
    pub inner_radius: f32,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl GuideGeometry {
    /// Derive the guide from frame dimensions
    pub fn from_dimensions(width: u32, height: u32, config: &GuideConfig) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let short_side = width.min(height) as f32;
        Some(Self {
            center_x: width as f32 / 2.0,
            center_y: height as f32 / 2.0,
            outer_radius: short_side * config.outer_radius_ratio,
            inner_radius: short_side * config.inner_radius_ratio,
            frame_width: width,
            frame_height: height,
        })
    }

    pub fn inner_diameter(&self) -> f32 {
        self.inner_radius * 2.0
    }

    pub fn distance_from_center(&self, x: f32, y: f32) -> f32 {
        ((x - self.center_x).powi(2) + (y - self.center_y).powi(2)).sqrt()
    }

    /// Whether (x, y) lies within `scale` times the outer radius
    pub fn within_outer(&self, x: f32, y: f32, scale: f32) -> bool {
        self.distance_from_center(x, y) <= self.outer_radius * scale
    }

    pub fn within_inner(&self, x: f32, y: f32) -> bool {
        self.distance_from_center(x, y) <= self.inner_radius
    }
}

/// Holds the current guide and recomputes it when frame dimensions change
#[derive(Debug, Clone, Default)]
pub struct FaceGuide {
    config: GuideConfig,
    geometry: Option<GuideGeometry>,
}

impl FaceGuide {
    pub fn new(config: GuideConfig) -> Self {
        Self {
            config,
            geometry: None,
        }
    }

    /// Update for the given frame size; returns the current geometry
    pub fn observe_dimensions(&mut self, width: u32, height: u32) -> Option<&GuideGeometry> {
        let stale = match &self.geometry {
            Some(g) => g.frame_width != width || g.frame_height != height,
            None => true,
        };
        if stale {
            self.geometry = GuideGeometry::from_dimensions(width, height, &self.config);
            if let Some(g) = &self.geometry {
                debug!(
                    "Guide recomputed for {}x{}: outer {:.1}px inner {:.1}px",
                    width, height, g.outer_radius, g.inner_radius
                );
            }
        }
        self.geometry.as_ref()
    }

    pub fn geometry(&self) -> Option<&GuideGeometry> {
        self.geometry.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.geometry.is_some()
    }
}
