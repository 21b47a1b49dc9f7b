//! In-memory recorder
//!
//! Keeps a compact per-frame record (sequence, timestamp, dimensions) rather
//! than encoded video. Used by the simulator and tests.

use camera_capture::VideoFrame;
use tracing::debug;

use crate::{Chunk, RecorderError, RecorderEvent, RecorderEvents, RecorderSink, RecordingOptions};

const FRAME_RECORD_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecorderState {
    Idle,
    Recording,
    Paused,
}

impl RecorderState {
    fn name(&self) -> &'static str {
        match self {
            RecorderState::Idle => "idle",
            RecorderState::Recording => "recording",
            RecorderState::Paused => "paused",
        }
    }
}

/// Recorder that buffers frame records and emits them in fixed-size chunks
pub struct MemoryRecorder {
    frames_per_chunk: usize,
    state: RecorderState,
    pending: Vec<u8>,
    pending_frames: usize,
    events: Option<RecorderEvents>,
    fail_next_start: bool,
    frames_written: u64,
}

impl MemoryRecorder {
    pub fn new(frames_per_chunk: usize) -> Self {
        Self {
            frames_per_chunk: frames_per_chunk.max(1),
            state: RecorderState::Idle,
            pending: Vec::new(),
            pending_frames: 0,
            events: None,
            fail_next_start: false,
            frames_written: 0,
        }
    }

    /// Make the next `start` fail with a backend error
    pub fn fail_next_start(&mut self) {
        self.fail_next_start = true;
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn events(&self) -> Result<&RecorderEvents, RecorderError> {
        self.events.as_ref().ok_or(RecorderError::InvalidState {
            operation: "emit",
            state: self.state.name(),
        })
    }

    fn expect_state(&self, expected: RecorderState, operation: &'static str) -> Result<(), RecorderError> {
        if self.state != expected {
            return Err(RecorderError::InvalidState {
                operation,
                state: self.state.name(),
            });
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), RecorderError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let bytes = std::mem::take(&mut self.pending);
        self.pending_frames = 0;
        self.events()?.emit(RecorderEvent::Chunk(Chunk::new(bytes)))
    }
}

impl Default for MemoryRecorder {
    fn default() -> Self {
        Self::new(10)
    }
}

impl RecorderSink for MemoryRecorder {
    fn start(&mut self, options: &RecordingOptions, events: RecorderEvents) -> Result<(), RecorderError> {
        self.expect_state(RecorderState::Idle, "start")?;
        if self.fail_next_start {
            self.fail_next_start = false;
            return Err(RecorderError::Backend("encoder unavailable".to_string()));
        }

        debug!(
            "Memory recorder {:?} started for segment {} at {}s",
            options.slot, options.segment, options.resume_from
        );
        self.pending.clear();
        self.pending_frames = 0;
        self.state = RecorderState::Recording;
        events.emit(RecorderEvent::Started)?;
        self.events = Some(events);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), RecorderError> {
        self.expect_state(RecorderState::Recording, "pause")?;
        self.state = RecorderState::Paused;
        self.events()?.emit(RecorderEvent::Paused)
    }

    fn resume(&mut self) -> Result<(), RecorderError> {
        self.expect_state(RecorderState::Paused, "resume")?;
        self.state = RecorderState::Recording;
        self.events()?.emit(RecorderEvent::Resumed)
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        if self.state == RecorderState::Idle {
            return Err(RecorderError::InvalidState {
                operation: "stop",
                state: self.state.name(),
            });
        }
        self.flush()?;
        self.state = RecorderState::Idle;
        let result = self.events()?.emit(RecorderEvent::Stopped);
        self.events = None;
        result
    }

    fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), RecorderError> {
        if self.state != RecorderState::Recording {
            return Ok(());
        }

        self.pending.reserve(FRAME_RECORD_LEN);
        self.pending.extend_from_slice(&frame.sequence.to_le_bytes());
        self.pending.extend_from_slice(&frame.timestamp_ns.to_le_bytes());
        self.pending.extend_from_slice(&frame.width.to_le_bytes());
        self.pending.extend_from_slice(&frame.height.to_le_bytes());
        self.pending_frames += 1;
        self.frames_written += 1;

        if self.pending_frames >= self.frames_per_chunk {
            self.flush()?;
        }
        Ok(())
    }
}
