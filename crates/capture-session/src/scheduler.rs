//! Detection loop scheduling
//!
//! One tick per display refresh. The loop halts for good once the frame
//! source goes inactive and idles until the guide geometry is known; after
//! that the quality analyzer and the face locator run on every K-th frame.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::LoopConfig;

/// Work for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickPlan {
    pub frame_index: u64,
    pub run_quality: bool,
    pub run_locator: bool,
}

/// What the loop does this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopAction {
    /// Frame source gone; terminal
    Halt,
    /// Nothing to do until the guide is ready
    Reschedule,
    Run(TickPlan),
}

/// Frame counter with sub-sampled fan-out
#[derive(Debug, Clone)]
pub struct DetectionLoop {
    quality_every: u64,
    locate_every: u64,
    frames: u64,
    halted: bool,
}

impl DetectionLoop {
    pub fn new(config: &LoopConfig) -> Self {
        Self {
            quality_every: config.quality_every.max(1),
            locate_every: config.locate_every.max(1),
            frames: 0,
            halted: false,
        }
    }

    pub fn tick(&mut self, source_active: bool, guide_ready: bool) -> LoopAction {
        if self.halted {
            return LoopAction::Halt;
        }
        if !source_active {
            info!("Frame source inactive after {} frames, halting detection loop", self.frames);
            self.halted = true;
            return LoopAction::Halt;
        }
        if !guide_ready {
            return LoopAction::Reschedule;
        }

        self.frames += 1;
        LoopAction::Run(TickPlan {
            frame_index: self.frames,
            run_quality: self.frames % self.quality_every == 0,
            run_locator: self.frames % self.locate_every == 0,
        })
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }
}
