//! Quality analyzer configuration

use serde::{Deserialize, Serialize};

/// Quality thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Mean luminance below this is too dark
    pub dark_threshold: f32,

    /// Mean luminance above this is too bright
    pub bright_threshold: f32,

    /// A pixel is near-black when every channel is below this
    pub blank_channel_max: u8,

    /// Fraction of near-black pixels that marks the feed as blank
    pub blank_fraction: f32,

    /// Luminance variance below this means the frame is blurred
    pub blur_variance_min: f32,

    /// Luminance cutoff for bright spot candidates
    pub spot_luma_cutoff: u8,

    /// Bright region bounds (pixels)
    pub spot_min_area: f32,
    pub spot_max_area: f32,
    pub spot_min_radius: f32,
    pub spot_max_radius: f32,

    /// Circularity bounds, 4π·area/perimeter²
    pub spot_min_circularity: f32,
    pub spot_max_circularity: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            dark_threshold: 60.0,
            bright_threshold: 180.0,
            blank_channel_max: 30,
            blank_fraction: 0.95,
            blur_variance_min: 50.0,
            spot_luma_cutoff: 230,
            spot_min_area: 500.0,
            spot_max_area: 70_000.0,
            spot_min_radius: 20.0,
            spot_max_radius: 180.0,
            spot_min_circularity: 0.3,
            spot_max_circularity: 1.3,
        }
    }
}

impl QualityConfig {
    /// Tolerate dimmer rooms and softer webcams
    pub fn lenient() -> Self {
        Self {
            dark_threshold: 45.0,
            bright_threshold: 200.0,
            blur_variance_min: 30.0,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.dark_threshold >= self.bright_threshold {
            return Err(format!(
                "dark threshold {} must be below bright threshold {}",
                self.dark_threshold, self.bright_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.blank_fraction) {
            return Err(format!("blank fraction {} must be within 0..=1", self.blank_fraction));
        }
        if self.spot_min_area > self.spot_max_area
            || self.spot_min_radius > self.spot_max_radius
            || self.spot_min_circularity > self.spot_max_circularity
        {
            return Err("bright spot bounds are inverted".to_string());
        }
        Ok(())
    }
}
