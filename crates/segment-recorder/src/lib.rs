//! Segment Recording
//!
//! Building blocks for the segmented liveness recording:
//! - Randomized segment plans that sum to the session total
//! - The recorder sink interface and its event stream
//! - Per-segment elapsed/grace/restart bookkeeping
//! - Segment, partial and challenge clip artifacts with a JSON manifest

pub mod artifact;
pub mod memory;
pub mod plan;
pub mod recorder;
pub mod state;

pub use artifact::{
    ArtifactBundle, ArtifactKind, ArtifactManifest, ChallengeClip, ManifestEntry, PartialArtifact,
    SegmentArtifact,
};
pub use memory::MemoryRecorder;
pub use plan::{SegmentPlan, MIN_TOTAL_SECONDS, SEGMENT_COUNT};
pub use recorder::{
    Chunk, RecorderEvent, RecorderEvents, RecorderSink, RecorderSlot, RecordingOptions, SlotEvent,
};
pub use state::{SecondOutcome, SegmentRecordingState, StopOutcome, MAX_GRACE_SECONDS};

use thiserror::Error;

/// Segment plan error types
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Session total of {total}s is below the {min}s minimum")]
    TooShort { total: u32, min: u32 },

    #[error("Segment targets must be at least one second")]
    EmptySegment,
}

/// Recorder error types
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Recorder backend error: {0}")]
    Backend(String),

    #[error("Recorder event channel closed")]
    ChannelClosed,
}
