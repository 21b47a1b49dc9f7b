//! Per-segment recording bookkeeping
//!
//! Tracks elapsed seconds, the grace second, validity and the chunks of the
//! current recorder run, and decides what a recorder stop means: a completed
//! segment, a partial artifact from a restart, or a retry.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Chunk;

/// Extra seconds allowed past the target when a run was interrupted
pub const MAX_GRACE_SECONDS: u32 = 1;

/// Result of one per-second tick while recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecondOutcome {
    /// Second counted; target not reached yet
    Counted { elapsed: u32 },
    /// Target reached on a clean run, or the grace second was spent: stop now
    Complete { elapsed: u32 },
    /// Target already reached on an interrupted run; this second is grace, stop now
    Grace,
}

impl SecondOutcome {
    pub fn should_stop(&self) -> bool {
        !matches!(self, SecondOutcome::Counted { .. })
    }

    /// Whether a recorded second was added
    pub fn advanced(&self) -> bool {
        !matches!(self, SecondOutcome::Grace)
    }
}

/// What a recorder stop produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Target met with data: emit a segment artifact
    Completed {
        start_second: u32,
        end_second: u32,
        chunks: Vec<Chunk>,
    },
    /// Stopped for a restart with data recorded
    Partial {
        start_second: u32,
        end_second: u32,
        chunks: Vec<Chunk>,
    },
    /// Stopped for a restart with nothing worth keeping
    Discarded,
    /// Target missed, no data or invalid: record again from this offset
    Retry { resume_from: u32 },
}

/// Recording state of the current segment
#[derive(Debug, Clone)]
pub struct SegmentRecordingState {
    segment: usize,
    target: u32,
    elapsed: u32,
    grace_used: u32,
    valid: bool,
    clean: bool,
    chunks: Vec<Chunk>,
    run_start: u32,
    restarting: bool,
    adjusted_for: Option<u32>,
}

impl Default for SegmentRecordingState {
    fn default() -> Self {
        Self {
            segment: 0,
            target: 0,
            elapsed: 0,
            grace_used: 0,
            valid: true,
            clean: true,
            chunks: Vec::new(),
            run_start: 0,
            restarting: false,
            adjusted_for: None,
        }
    }
}

impl SegmentRecordingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare for a recorder run. `resume_from` 0 resets everything.
    pub fn begin(&mut self, segment: usize, target: u32, resume_from: u32) {
        if resume_from == 0 || segment != self.segment {
            self.grace_used = 0;
            self.clean = resume_from == 0;
            self.adjusted_for = None;
        } else {
            self.clean = false;
        }
        self.valid = true;
        self.segment = segment;
        self.target = target;
        self.elapsed = resume_from;
        self.run_start = resume_from;
        self.chunks.clear();
        self.restarting = false;
        debug!(
            "Segment {} recording from {}s (target {}s)",
            segment + 1,
            resume_from,
            target
        );
    }

    pub fn push_chunk(&mut self, chunk: Chunk) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    /// The recorder was paused; the run is no longer clean
    pub fn mark_paused(&mut self) {
        self.clean = false;
    }

    /// Recorder failure: this run can no longer complete
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn mark_restarting(&mut self) {
        self.restarting = true;
    }

    /// Count one recorded second
    pub fn tick(&mut self) -> SecondOutcome {
        if self.elapsed < self.target {
            self.elapsed += 1;
            if self.elapsed >= self.target && self.clean {
                return SecondOutcome::Complete {
                    elapsed: self.elapsed,
                };
            }
            return SecondOutcome::Counted {
                elapsed: self.elapsed,
            };
        }

        if self.grace_used < MAX_GRACE_SECONDS {
            self.grace_used += 1;
            return SecondOutcome::Grace;
        }
        SecondOutcome::Complete {
            elapsed: self.elapsed,
        }
    }

    /// Interpret a recorder stop
    pub fn finish(&mut self) -> StopOutcome {
        let chunks = std::mem::take(&mut self.chunks);

        if self.restarting {
            self.restarting = false;
            if chunks.is_empty() || self.elapsed == 0 || self.elapsed <= self.run_start {
                return StopOutcome::Discarded;
            }
            return StopOutcome::Partial {
                start_second: self.run_start,
                end_second: self.elapsed,
                chunks,
            };
        }

        if !chunks.is_empty() && self.elapsed >= self.target && self.valid {
            return StopOutcome::Completed {
                start_second: self.run_start,
                end_second: self.elapsed,
                chunks,
            };
        }

        StopOutcome::Retry {
            resume_from: self.retry_offset(),
        }
    }

    /// Offset for a retry after an unsuccessful stop
    pub fn retry_offset(&self) -> u32 {
        self.elapsed.min(self.target.saturating_sub(1))
    }

    /// Offset for a restart after face loss or a quality problem.
    ///
    /// Steps back one second, but only once per elapsed value: restarting
    /// again before another second is counted resumes from the same point.
    pub fn restart_offset(&mut self) -> u32 {
        if self.adjusted_for == Some(self.elapsed) {
            return self.elapsed;
        }
        let offset = self.elapsed.saturating_sub(1);
        self.elapsed = offset;
        self.adjusted_for = Some(offset);
        offset
    }

    pub fn segment(&self) -> usize {
        self.segment
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn elapsed(&self) -> u32 {
        self.elapsed
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_clean(&self) -> bool {
        self.clean
    }

    pub fn is_restarting(&self) -> bool {
        self.restarting
    }

    pub fn grace_used(&self) -> u32 {
        self.grace_used
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
