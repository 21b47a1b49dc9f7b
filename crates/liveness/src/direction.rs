//! Challenge directions and selection

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Requested head movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Movement axis measured for a direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Yaw,
    Pitch,
}

impl ChallengeDirection {
    pub const ALL: [ChallengeDirection; 4] = [
        ChallengeDirection::Up,
        ChallengeDirection::Down,
        ChallengeDirection::Left,
        ChallengeDirection::Right,
    ];

    pub fn axis(&self) -> Axis {
        match self {
            ChallengeDirection::Up | ChallengeDirection::Down => Axis::Pitch,
            ChallengeDirection::Left | ChallengeDirection::Right => Axis::Yaw,
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            ChallengeDirection::Up => "Slowly tilt your head up",
            ChallengeDirection::Down => "Slowly tilt your head down",
            ChallengeDirection::Left => "Slowly turn your head left",
            ChallengeDirection::Right => "Slowly turn your head right",
        }
    }
}

/// Pick a direction not used earlier in the session.
///
/// Once every direction has been used, any direction other than `last` is
/// eligible so consecutive challenges never repeat.
pub fn pick_direction<R: Rng + ?Sized>(
    used: &[ChallengeDirection],
    last: Option<ChallengeDirection>,
    rng: &mut R,
) -> ChallengeDirection {
    let fresh: Vec<ChallengeDirection> = ChallengeDirection::ALL
        .iter()
        .copied()
        .filter(|d| !used.contains(d))
        .collect();

    let candidates = if fresh.is_empty() {
        ChallengeDirection::ALL
            .iter()
            .copied()
            .filter(|d| Some(*d) != last)
            .collect()
    } else {
        fresh
    };

    candidates
        .choose(rng)
        .copied()
        .unwrap_or(ChallengeDirection::Down)
}
