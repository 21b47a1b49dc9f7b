//! Frame Quality Analysis
//!
//! Per-sample checks that gate the liveness recording:
//! - Brightness (mean Rec. 709 luminance)
//! - Blank feed (covered lens, dead stream)
//! - Blur (luminance variance)
//! - Localized bright spots inside the face guide (glare, screen replay)

pub mod bright_spot;
pub mod config;
pub mod statistics;

pub use bright_spot::{find_bright_spot, BrightSpot};
pub use config::QualityConfig;
pub use statistics::LuminanceStats;

use camera_capture::{GuideGeometry, VideoFrame};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Quality analysis error types
#[derive(Error, Debug)]
pub enum QualityError {
    #[error("Malformed frame: {width}x{height} with {len} bytes")]
    MalformedFrame { width: u32, height: u32, len: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Brightness classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrightnessLevel {
    TooDark,
    Acceptable,
    TooBright,
}

/// Quality issue types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityIssue {
    /// Feed is (almost) entirely black
    BlankFeed,
    /// Glare or a replay screen inside the guide
    BrightSpot,
    TooDark,
    TooBright,
    Blurred,
    /// Measured camera frame rate is below the minimum
    LowFrameRate,
}

impl QualityIssue {
    /// User-facing guidance for this issue
    pub fn message(&self) -> &'static str {
        match self {
            QualityIssue::BlankFeed => "Camera feed is blank. Make sure the lens is not covered",
            QualityIssue::BrightSpot => "Bright reflection detected. Avoid glare on your face",
            QualityIssue::TooDark => "Too dark. Move to a brighter place",
            QualityIssue::TooBright => "Too bright. Reduce the light behind or in front of you",
            QualityIssue::Blurred => "Image is blurry. Hold the camera steady",
            QualityIssue::LowFrameRate => "Camera is running slowly. Close other applications",
        }
    }
}

/// Complete quality analysis result for one sampled frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub brightness: f32,
    pub brightness_level: BrightnessLevel,
    pub blank_fraction: f32,
    pub blank: bool,
    pub luminance_variance: f32,
    pub blurred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bright_spot: Option<BrightSpot>,
}

impl QualityReport {
    /// All positive flags, most severe first
    pub fn issues(&self) -> Vec<QualityIssue> {
        let mut issues = Vec::new();
        if self.blank {
            issues.push(QualityIssue::BlankFeed);
        }
        if self.bright_spot.is_some() {
            issues.push(QualityIssue::BrightSpot);
        }
        match self.brightness_level {
            BrightnessLevel::TooDark => issues.push(QualityIssue::TooDark),
            BrightnessLevel::TooBright => issues.push(QualityIssue::TooBright),
            BrightnessLevel::Acceptable => {}
        }
        if self.blurred {
            issues.push(QualityIssue::Blurred);
        }
        issues
    }

    /// Highest priority issue
    pub fn primary_issue(&self) -> Option<QualityIssue> {
        self.issues().first().copied()
    }

    pub fn is_acceptable(&self) -> bool {
        self.primary_issue().is_none()
    }
}

/// Frame quality analyzer
pub struct QualityAnalyzer {
    config: QualityConfig,
}

impl QualityAnalyzer {
    pub fn new(config: QualityConfig) -> Result<Self, QualityError> {
        config.validate().map_err(QualityError::Config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Analyze a single frame. The guide masks the bright spot search.
    pub fn analyze(
        &self,
        frame: &VideoFrame,
        guide: &GuideGeometry,
    ) -> Result<QualityReport, QualityError> {
        if !frame.is_well_formed() {
            return Err(QualityError::MalformedFrame {
                width: frame.width,
                height: frame.height,
                len: frame.data.len(),
            });
        }

        let stats = LuminanceStats::compute(frame, self.config.blank_channel_max);
        let brightness_level = self.classify_brightness(stats.mean);
        let blank = stats.blank_fraction > self.config.blank_fraction;
        let blurred = stats.variance < self.config.blur_variance_min;

        // A blank feed has no glare worth looking for
        let bright_spot = if blank {
            None
        } else {
            find_bright_spot(frame, guide, &self.config)
        };

        let report = QualityReport {
            brightness: stats.mean,
            brightness_level,
            blank_fraction: stats.blank_fraction,
            blank,
            luminance_variance: stats.variance,
            blurred,
            bright_spot,
        };

        if let Some(issue) = report.primary_issue() {
            debug!(
                "Frame {} quality issue {:?} (brightness {:.1}, variance {:.1})",
                frame.sequence, issue, stats.mean, stats.variance
            );
        }

        Ok(report)
    }

    fn classify_brightness(&self, mean: f32) -> BrightnessLevel {
        if mean < self.config.dark_threshold {
            BrightnessLevel::TooDark
        } else if mean > self.config.bright_threshold {
            BrightnessLevel::TooBright
        } else {
            BrightnessLevel::Acceptable
        }
    }
}

impl Default for QualityAnalyzer {
    fn default() -> Self {
        Self {
            config: QualityConfig::default(),
        }
    }
}
