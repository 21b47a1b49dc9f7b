//! Controller inputs and outputs
//!
//! The controller never calls out. Everything it learns arrives as an
//! [`Event`]; everything it wants done leaves as an [`Effect`], and results
//! of effects come back as further events.

use camera_capture::{CaptureWarning, GuideGeometry};
use face_tracking::{Descriptor, LocatorOutput};
use frame_quality::QualityReport;
use segment_recorder::{ArtifactBundle, ArtifactKind, RecorderEvent, RecorderSlot, RecordingOptions};
use serde::{Deserialize, Serialize};

/// Output of one detection loop tick
#[derive(Debug, Clone)]
pub struct Observation {
    pub guide: GuideGeometry,
    /// Present on quality sampling ticks
    pub quality: Option<QualityReport>,
    /// Measured frame rate is below the minimum
    pub low_frame_rate: bool,
    /// Present on locator sampling ticks
    pub locator: Option<LocatorOutput>,
}

/// Controller input
#[derive(Debug, Clone)]
pub enum Event {
    Observation(Observation),
    /// Time advanced; fire due timers
    Clock,
    Recorder {
        slot: RecorderSlot,
        event: RecorderEvent,
    },
    /// Answer to [`Effect::CaptureReference`]
    ReferenceCaptured(Option<Descriptor>),
    /// Answer to [`Effect::CheckIdentity`]; `None` when no descriptor was available
    IdentitySample { distance: Option<f32> },
    CaptureWarning(CaptureWarning),
    /// The camera stream ended
    CameraStopped,
}

/// Commands for a recorder slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecorderCommand {
    Start(RecordingOptions),
    Pause,
    Resume,
    Stop,
}

/// Status channel keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusKey {
    Camera,
    Quality,
    Alignment,
    Identity,
    Recording,
    Verification,
    Session,
}

/// Keyed human-readable status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub key: StatusKey,
    pub message: String,
}

/// Controller output
#[derive(Debug, Clone)]
pub enum Effect {
    Recorder {
        slot: RecorderSlot,
        command: RecorderCommand,
    },
    /// Extract the reference descriptor from the current frame
    CaptureReference,
    /// Describe the current frame and report its distance to `reference`
    CheckIdentity { reference: Descriptor },
    Status(StatusUpdate),
    /// An artifact was added to the session ledger
    ArtifactStored { kind: ArtifactKind, segment: usize },
    SessionCompleted(Box<ArtifactBundle>),
    /// Camera gone: stop everything
    Halt,
}

impl Effect {
    pub fn recorder(slot: RecorderSlot, command: RecorderCommand) -> Self {
        Effect::Recorder { slot, command }
    }
}
