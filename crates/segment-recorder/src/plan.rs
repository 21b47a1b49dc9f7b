//! Segment plan generation

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::PlanError;

/// Segments per session
pub const SEGMENT_COUNT: usize = 3;

/// Shortest total that leaves every segment at least its floor
pub const MIN_TOTAL_SECONDS: u32 = 5;

/// Whole-second targets for each segment, summing to the session total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPlan {
    targets: [u32; SEGMENT_COUNT],
}

impl SegmentPlan {
    /// Randomized plan: first in {2, 3}, second in {2, 3, 4}, last takes the rest.
    ///
    /// Upper bounds shrink for short totals so the last segment keeps at least
    /// one second.
    pub fn generate<R: Rng + ?Sized>(total: u32, rng: &mut R) -> Result<Self, PlanError> {
        if total < MIN_TOTAL_SECONDS {
            return Err(PlanError::TooShort {
                total,
                min: MIN_TOTAL_SECONDS,
            });
        }

        let first_max = 3.min(total - 3);
        let first = rng.gen_range(2..=first_max);

        let second_max = 4.min(total - first - 1);
        let second = rng.gen_range(2..=second_max);

        let last = total - first - second;
        Ok(Self {
            targets: [first, second, last],
        })
    }

    /// Plan with explicit targets
    pub fn from_targets(targets: [u32; SEGMENT_COUNT]) -> Result<Self, PlanError> {
        if targets.iter().any(|&t| t == 0) {
            return Err(PlanError::EmptySegment);
        }
        Ok(Self { targets })
    }

    pub fn target(&self, index: usize) -> Option<u32> {
        self.targets.get(index).copied()
    }

    pub fn targets(&self) -> &[u32] {
        &self.targets
    }

    pub fn total(&self) -> u32 {
        self.targets.iter().sum()
    }

    pub fn len(&self) -> usize {
        SEGMENT_COUNT
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn is_last(&self, index: usize) -> bool {
        index + 1 == SEGMENT_COUNT
    }
}
