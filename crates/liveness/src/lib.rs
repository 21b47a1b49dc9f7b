//! Liveness Challenge
//!
//! Randomized directional head-movement challenges:
//! - Direction selection without repeats
//! - Yaw / pitch signals from facial landmarks
//! - Near / confirm hysteresis with drift and timeout handling
//! - Attempt limits with deferral and session reset escalation

pub mod challenge;
pub mod config;
pub mod direction;
pub mod policy;
pub mod pose;

pub use challenge::{ChallengeStep, ChallengeTracker};
pub use config::ChallengeConfig;
pub use direction::{pick_direction, Axis, ChallengeDirection};
pub use policy::{FailureAction, VerificationPolicy};
pub use pose::PoseSample;

use thiserror::Error;

/// Liveness error types
#[derive(Error, Debug)]
pub enum LivenessError {
    #[error("Configuration error: {0}")]
    Config(String),
}
