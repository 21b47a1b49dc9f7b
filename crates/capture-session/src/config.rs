//! Session configuration
//!
//! Every component config has serde defaults, so a partial file or a handful
//! of environment overrides is enough. Environment variables use the
//! `LIVENESS__` prefix with `__` between nested keys, e.g.
//! `LIVENESS__TIMING__RESTART_DELAY_MS=1500`.

use std::path::Path;

use camera_capture::{CaptureRequirements, GuideConfig};
use face_tracking::{AlignmentConfig, IdentityConfig};
use frame_quality::QualityConfig;
use liveness::ChallengeConfig;
use segment_recorder::MIN_TOTAL_SECONDS;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::SessionError;

/// Detection loop sub-sampling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Display refresh rate driving the loop (Hz)
    pub refresh_hz: f32,
    /// Run the quality analyzer every N frames
    pub quality_every: u64,
    /// Run the face locator every N frames
    pub locate_every: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            refresh_hz: 60.0,
            quality_every: 6,
            locate_every: 1,
        }
    }
}

/// Logical timer durations (milliseconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Per-second recording countdown
    pub segment_tick_ms: u64,
    /// Delay before a segment restarts after face loss or a quality problem
    pub restart_delay_ms: u64,
    /// Delay before retrying a segment that stopped short
    pub retry_delay_ms: u64,
    /// Delay before moving to the next segment
    pub advance_delay_ms: u64,
    /// Minimum spacing of identity checks on aligned ticks
    pub identity_interval_ms: u64,
    /// Identical status messages are republished at most this often
    pub status_cooldown_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            segment_tick_ms: 1000,
            restart_delay_ms: 1000,
            retry_delay_ms: 500,
            advance_delay_ms: 500,
            identity_interval_ms: 500,
            status_cooldown_ms: 2000,
        }
    }
}

/// Complete session configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Total recorded seconds across all segments
    pub total_seconds: u32,
    /// Seed for direction and plan randomization; entropy when absent
    pub seed: Option<u64>,
    pub guide: GuideConfig,
    pub capture: CaptureRequirements,
    pub quality: QualityConfig,
    pub alignment: AlignmentConfig,
    pub identity: IdentityConfig,
    pub challenge: ChallengeConfig,
    pub detection: LoopConfig,
    pub timing: TimingConfig,
}

impl SessionConfig {
    pub const DEFAULT_TOTAL_SECONDS: u32 = 10;

    /// Defaults with the standard session length
    pub fn standard() -> Self {
        Self {
            total_seconds: Self::DEFAULT_TOTAL_SECONDS,
            ..Default::default()
        }
    }

    /// Load from an optional file plus `LIVENESS__*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, SessionError> {
        let defaults = config::Config::try_from(&Self::standard())?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            info!("Loading session config from {}", path.display());
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("LIVENESS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: Self = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values the session cannot run with
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.total_seconds < MIN_TOTAL_SECONDS {
            return Err(SessionError::Config(format!(
                "total_seconds must be at least {}, got {}",
                MIN_TOTAL_SECONDS, self.total_seconds
            )));
        }
        if self.detection.quality_every == 0 || self.detection.locate_every == 0 {
            return Err(SessionError::Config(
                "detection sampling intervals must be non-zero".to_string(),
            ));
        }
        if !(self.detection.refresh_hz.is_finite() && self.detection.refresh_hz >= 1.0) {
            return Err(SessionError::Config(format!(
                "refresh rate must be a finite value of at least 1 Hz, got {}",
                self.detection.refresh_hz
            )));
        }
        if self.timing.segment_tick_ms == 0 {
            return Err(SessionError::Config("segment tick must be non-zero".to_string()));
        }
        if self.guide.inner_radius_ratio >= self.guide.outer_radius_ratio {
            return Err(SessionError::Config(
                "guide inner radius must be smaller than the outer radius".to_string(),
            ));
        }
        self.quality.validate().map_err(SessionError::Config)?;
        self.alignment.validate().map_err(SessionError::Config)?;
        self.challenge.validate().map_err(SessionError::Config)?;
        Ok(())
    }
}
