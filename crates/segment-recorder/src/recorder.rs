//! Recorder sink interface
//!
//! A recorder encodes frames from the shared camera stream. Lifecycle changes
//! and encoded chunks are reported asynchronously as [`RecorderEvent`]s on the
//! channel handed over at start, in the order they happened.

use camera_capture::VideoFrame;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::RecorderError;

/// Which recorder an event or command concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecorderSlot {
    /// Main segment recording
    Segment,
    /// Short clip captured during a liveness challenge
    Challenge,
}

/// Start parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingOptions {
    pub slot: RecorderSlot,
    /// Segment index (0-based) the recording belongs to
    pub segment: usize,
    /// Seconds already recorded for this segment; 0 is a clean start
    pub resume_from: u32,
}

/// Encoded media data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub bytes: Vec<u8>,
}

impl Chunk {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Recorder lifecycle and data events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecorderEvent {
    Started,
    Paused,
    Resumed,
    Chunk(Chunk),
    /// Final event of a recording; all chunks precede it
    Stopped,
    Error(String),
}

/// Event tagged with its slot
pub type SlotEvent = (RecorderSlot, RecorderEvent);

/// Sending half handed to a recorder on start
#[derive(Debug, Clone)]
pub struct RecorderEvents {
    slot: RecorderSlot,
    tx: mpsc::UnboundedSender<SlotEvent>,
}

impl RecorderEvents {
    pub fn new(slot: RecorderSlot, tx: mpsc::UnboundedSender<SlotEvent>) -> Self {
        Self { slot, tx }
    }

    pub fn slot(&self) -> RecorderSlot {
        self.slot
    }

    pub fn emit(&self, event: RecorderEvent) -> Result<(), RecorderError> {
        self.tx
            .send((self.slot, event))
            .map_err(|_| RecorderError::ChannelClosed)
    }
}

/// External recorder capability
pub trait RecorderSink: Send {
    /// Begin a new recording; `Started` follows on `events`
    fn start(&mut self, options: &RecordingOptions, events: RecorderEvents) -> Result<(), RecorderError>;

    fn pause(&mut self) -> Result<(), RecorderError>;

    fn resume(&mut self) -> Result<(), RecorderError>;

    /// Flush remaining data then emit `Stopped`
    fn stop(&mut self) -> Result<(), RecorderError>;

    /// Feed one camera frame; ignored unless actively recording
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), RecorderError>;
}
