//! Face tracking configuration

use serde::{Deserialize, Serialize};

/// Alignment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Fill ratio smoothing window (samples)
    pub window_size: usize,

    /// Smoothed fill ratio bounds (face height / guide inner diameter)
    pub min_fill_ratio: f32,
    pub max_fill_ratio: f32,

    /// Landmarks must lie within this multiple of the outer guide radius
    pub containment_scale: f32,

    /// Face centres within this multiple of the outer radius count as "in the guide"
    pub multi_face_scale: f32,

    /// Consecutive passing ticks before alignment is accepted
    pub required_consecutive: u32,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            min_fill_ratio: 0.55,
            max_fill_ratio: 0.80,
            containment_scale: 1.2,
            multi_face_scale: 1.2,
            required_consecutive: 3,
        }
    }
}

impl AlignmentConfig {
    /// Create strict config (narrower size band, longer hold)
    pub fn strict() -> Self {
        Self {
            min_fill_ratio: 0.60,
            max_fill_ratio: 0.75,
            required_consecutive: 6,
            ..Default::default()
        }
    }

    /// Create lenient config (wider size band)
    pub fn lenient() -> Self {
        Self {
            min_fill_ratio: 0.45,
            max_fill_ratio: 0.90,
            required_consecutive: 2,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.window_size == 0 {
            return Err("alignment window size must be at least 1".to_string());
        }
        if self.min_fill_ratio >= self.max_fill_ratio {
            return Err(format!(
                "fill ratio bounds inverted: {} >= {}",
                self.min_fill_ratio, self.max_fill_ratio
            ));
        }
        if self.required_consecutive == 0 {
            return Err("required consecutive ticks must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Identity consistency configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Descriptor distance above which the face counts as a mismatch
    pub max_distance: f32,

    /// Consecutive mismatches that confirm a different person
    pub mismatch_run_limit: u32,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            max_distance: 0.6,
            mismatch_run_limit: 3,
        }
    }
}
