//! When to verify and how to escalate failures
//!
//! Verification follows the first and second segments. When the second
//! verification exhausts its attempts it is deferred until after the third
//! segment; exhausting either the first or the deferred verification resets
//! the whole session.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{pick_direction, ChallengeConfig, ChallengeDirection, LivenessError};

/// Escalation after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureAction {
    /// Attempts remain: issue another challenge
    Retry,
    /// Move on and verify again after the final segment
    Defer,
    /// Discard everything and start over from segment 1
    ResetSession,
}

/// Attempt counting and direction history for one session
#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    max_attempts: u32,
    attempts: u32,
    deferred: bool,
    used: Vec<ChallengeDirection>,
    last: Option<ChallengeDirection>,
}

impl VerificationPolicy {
    pub fn new(config: &ChallengeConfig) -> Result<Self, LivenessError> {
        config.validate().map_err(LivenessError::Config)?;
        Ok(Self {
            max_attempts: config.max_attempts,
            attempts: 0,
            deferred: false,
            used: Vec::new(),
            last: None,
        })
    }

    /// Whether a verification follows the completed segment (0-based index)
    pub fn due_after(&self, segment: usize) -> bool {
        match segment {
            0 | 1 => true,
            2 => self.deferred,
            _ => false,
        }
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn used_directions(&self) -> &[ChallengeDirection] {
        &self.used
    }

    /// Choose and record the direction for the next attempt
    pub fn next_direction<R: Rng + ?Sized>(&mut self, rng: &mut R) -> ChallengeDirection {
        let direction = pick_direction(&self.used, self.last, rng);
        if !self.used.contains(&direction) {
            self.used.push(direction);
        }
        self.last = Some(direction);
        direction
    }

    pub fn record_success(&mut self, segment: usize) {
        info!(
            "Verification after segment {} passed on attempt {}",
            segment + 1,
            self.attempts + 1
        );
        self.attempts = 0;
        if segment >= 2 {
            self.deferred = false;
        }
    }

    pub fn record_failure(&mut self, segment: usize) -> FailureAction {
        self.attempts += 1;
        if self.attempts < self.max_attempts {
            return FailureAction::Retry;
        }

        self.attempts = 0;
        let action = match segment {
            1 => {
                self.deferred = true;
                FailureAction::Defer
            }
            _ => FailureAction::ResetSession,
        };
        warn!(
            "Verification after segment {} exhausted its attempts: {:?}",
            segment + 1,
            action
        );
        action
    }

    /// Clear all per-session state
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.deferred = false;
        self.used.clear();
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn policy() -> VerificationPolicy {
        VerificationPolicy::new(&ChallengeConfig::default()).unwrap()
    }

    #[test]
    fn test_schedule_without_deferral() {
        let p = policy();
        assert!(p.due_after(0));
        assert!(p.due_after(1));
        assert!(!p.due_after(2));
    }

    #[test]
    fn test_first_segment_exhaustion_resets() {
        let mut p = policy();
        assert_eq!(p.record_failure(0), FailureAction::Retry);
        assert_eq!(p.record_failure(0), FailureAction::ResetSession);
        assert_eq!(p.attempts(), 0);
    }

    #[test]
    fn test_second_segment_exhaustion_defers() {
        let mut p = policy();
        p.record_failure(1);
        assert_eq!(p.record_failure(1), FailureAction::Defer);
        assert!(p.due_after(2));

        assert_eq!(p.record_failure(2), FailureAction::Retry);
        assert_eq!(p.record_failure(2), FailureAction::ResetSession);
    }

    #[test]
    fn test_deferred_success_clears_deferral() {
        let mut p = policy();
        p.record_failure(1);
        p.record_failure(1);
        p.record_success(2);
        assert!(!p.is_deferred());
    }

    #[test]
    fn test_success_clears_attempts() {
        let mut p = policy();
        p.record_failure(0);
        p.record_success(0);
        assert_eq!(p.record_failure(1), FailureAction::Retry);
    }

    #[test]
    fn test_directions_unique_until_exhausted() {
        let mut p = policy();
        let mut rng = StdRng::seed_from_u64(3);
        let picked: Vec<_> = (0..4).map(|_| p.next_direction(&mut rng)).collect();
        for d in ChallengeDirection::ALL {
            assert!(picked.contains(&d));
        }
        let fifth = p.next_direction(&mut rng);
        assert_ne!(fifth, picked[3]);

        p.reset();
        assert!(p.used_directions().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ChallengeConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(
            VerificationPolicy::new(&config),
            Err(LivenessError::Config(_))
        ));
    }
}
