//! Identity consistency across the session
//!
//! Each check compares the live descriptor with the reference captured at the
//! start of the session. A missing descriptor (no face, locator miss) is
//! neutral: it is never counted as a mismatch, but it does end the current run.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::IdentityConfig;

/// Outcome of a single identity check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IdentityVerdict {
    /// No descriptor this time
    Neutral,
    Match { distance: f32 },
    Mismatch { distance: f32, run: u32 },
    /// Mismatch run reached the limit
    DifferentPerson { distance: f32 },
}

/// Counts consecutive descriptor mismatches
#[derive(Debug, Clone)]
pub struct IdentityChecker {
    config: IdentityConfig,
    mismatch_run: u32,
}

impl IdentityChecker {
    pub fn new(config: IdentityConfig) -> Self {
        Self {
            config,
            mismatch_run: 0,
        }
    }

    /// Feed one check result; `None` means no descriptor was available
    pub fn observe(&mut self, distance: Option<f32>) -> IdentityVerdict {
        let Some(distance) = distance else {
            self.mismatch_run = 0;
            return IdentityVerdict::Neutral;
        };

        if distance <= self.config.max_distance {
            if self.mismatch_run > 0 {
                debug!("Identity match after {} mismatches", self.mismatch_run);
            }
            self.mismatch_run = 0;
            return IdentityVerdict::Match { distance };
        }

        self.mismatch_run += 1;
        if self.mismatch_run >= self.config.mismatch_run_limit {
            warn!(
                "Different person detected: {} consecutive mismatches (distance {:.3})",
                self.mismatch_run, distance
            );
            self.mismatch_run = 0;
            IdentityVerdict::DifferentPerson { distance }
        } else {
            IdentityVerdict::Mismatch {
                distance,
                run: self.mismatch_run,
            }
        }
    }

    pub fn mismatch_run(&self) -> u32 {
        self.mismatch_run
    }

    pub fn reset(&mut self) {
        self.mismatch_run = 0;
    }
}
