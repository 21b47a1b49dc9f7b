//! Challenge configuration

use serde::{Deserialize, Serialize};

/// Liveness challenge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    /// Yaw displacement (fraction of inter-eye distance) that starts the clip
    pub yaw_near: f32,
    /// Yaw displacement that confirms a left/right turn
    pub yaw_confirm: f32,

    /// Relative pitch change that starts the clip
    pub pitch_near: f32,
    /// Relative pitch change that confirms an up/down tilt
    pub pitch_confirm: f32,

    /// Pose sampling interval (milliseconds)
    pub sample_interval_ms: u64,

    /// Hard limit for one attempt (milliseconds)
    pub timeout_ms: u64,

    /// Attempts per verification before escalation
    pub max_attempts: u32,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            yaw_near: 0.12,
            yaw_confirm: 0.25,
            pitch_near: 0.27,
            pitch_confirm: 0.38,
            sample_interval_ms: 150,
            timeout_ms: 30_000,
            max_attempts: 2,
        }
    }
}

impl ChallengeConfig {
    /// Create strict config (larger movements required)
    pub fn strict() -> Self {
        Self {
            yaw_confirm: 0.32,
            pitch_confirm: 0.45,
            timeout_ms: 20_000,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.yaw_near <= 0.0 || self.yaw_near >= self.yaw_confirm {
            return Err(format!(
                "yaw thresholds must satisfy 0 < near < confirm, got {} / {}",
                self.yaw_near, self.yaw_confirm
            ));
        }
        if self.pitch_near <= 0.0 || self.pitch_near >= self.pitch_confirm {
            return Err(format!(
                "pitch thresholds must satisfy 0 < near < confirm, got {} / {}",
                self.pitch_near, self.pitch_confirm
            ));
        }
        if self.sample_interval_ms == 0 {
            return Err("challenge sample interval must be non-zero".to_string());
        }
        if self.timeout_ms <= self.sample_interval_ms {
            return Err("challenge timeout must exceed the sample interval".to_string());
        }
        if self.max_attempts == 0 {
            return Err("at least one challenge attempt is required".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        assert!(ChallengeConfig::default().validate().is_ok());
        assert!(ChallengeConfig::strict().validate().is_ok());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let config = ChallengeConfig {
            pitch_near: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
