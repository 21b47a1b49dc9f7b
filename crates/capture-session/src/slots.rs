//! Recorder slot arbitration
//!
//! The camera stream backs one writing recorder at a time. Starting a slot
//! while the other is recording pauses the other first and waits for the
//! pause acknowledgement; the yielding slot is resumed once the starter
//! stops. A start requested while the slot itself is still stopping is held
//! until `Stopped` arrives.

use segment_recorder::{RecorderEvent, RecorderSlot, RecordingOptions};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::event::{Effect, RecorderCommand};

/// Lifecycle of one slot as seen by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStatus {
    Idle,
    Starting,
    Recording,
    Pausing,
    Paused,
    Resuming,
    Stopping,
}

impl SlotStatus {
    pub fn is_idle(&self) -> bool {
        matches!(self, SlotStatus::Idle)
    }
}

#[derive(Debug, Clone)]
struct SlotState {
    status: SlotStatus,
    queued: Option<RecordingOptions>,
    /// Paused to let the other slot record
    yielded: bool,
}

impl SlotState {
    fn new() -> Self {
        Self {
            status: SlotStatus::Idle,
            queued: None,
            yielded: false,
        }
    }
}

/// Segment and challenge recorder slots
#[derive(Debug, Clone)]
pub struct RecorderSlots {
    segment: SlotState,
    challenge: SlotState,
}

impl Default for RecorderSlots {
    fn default() -> Self {
        Self::new()
    }
}

impl RecorderSlots {
    pub fn new() -> Self {
        Self {
            segment: SlotState::new(),
            challenge: SlotState::new(),
        }
    }

    pub fn status(&self, slot: RecorderSlot) -> SlotStatus {
        self.state(slot).status
    }

    pub fn is_active(&self, slot: RecorderSlot) -> bool {
        !self.status(slot).is_idle()
    }

    pub fn has_queued_start(&self, slot: RecorderSlot) -> bool {
        self.state(slot).queued.is_some()
    }

    /// Request a recording on `options.slot`
    pub fn start(&mut self, options: RecordingOptions) -> Vec<Effect> {
        let slot = options.slot;
        match self.status(slot) {
            SlotStatus::Idle | SlotStatus::Stopping => {
                self.state_mut(slot).queued = Some(options);
                self.pump()
            }
            status => {
                warn!("Ignoring start of {:?} recorder while {:?}", slot, status);
                Vec::new()
            }
        }
    }

    pub fn pause(&mut self, slot: RecorderSlot) -> Vec<Effect> {
        if self.status(slot) != SlotStatus::Recording {
            return Vec::new();
        }
        self.state_mut(slot).status = SlotStatus::Pausing;
        vec![Effect::recorder(slot, RecorderCommand::Pause)]
    }

    pub fn resume(&mut self, slot: RecorderSlot) -> Vec<Effect> {
        let other = other_slot(slot);
        if self.status(slot) != SlotStatus::Paused || self.writing(other) {
            return Vec::new();
        }
        let state = self.state_mut(slot);
        state.status = SlotStatus::Resuming;
        state.yielded = false;
        vec![Effect::recorder(slot, RecorderCommand::Resume)]
    }

    pub fn stop(&mut self, slot: RecorderSlot) -> Vec<Effect> {
        let state = self.state_mut(slot);
        state.queued = None;
        match state.status {
            SlotStatus::Idle | SlotStatus::Stopping => Vec::new(),
            _ => {
                state.status = SlotStatus::Stopping;
                state.yielded = false;
                vec![Effect::recorder(slot, RecorderCommand::Stop)]
            }
        }
    }

    /// Apply a recorder event; returns follow-up commands
    pub fn on_event(&mut self, slot: RecorderSlot, event: &RecorderEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        let status = self.status(slot);
        match event {
            RecorderEvent::Started => {
                if status == SlotStatus::Starting {
                    self.state_mut(slot).status = SlotStatus::Recording;
                }
            }
            RecorderEvent::Paused => {
                if matches!(status, SlotStatus::Pausing | SlotStatus::Recording) {
                    self.state_mut(slot).status = SlotStatus::Paused;
                }
            }
            RecorderEvent::Resumed => {
                if matches!(status, SlotStatus::Resuming | SlotStatus::Paused) {
                    self.state_mut(slot).status = SlotStatus::Recording;
                }
            }
            RecorderEvent::Stopped => {
                let state = self.state_mut(slot);
                state.status = SlotStatus::Idle;
                state.yielded = false;
                let other = other_slot(slot);
                if self.state(other).yielded {
                    effects.extend(self.resume(other));
                }
            }
            RecorderEvent::Error(message) => {
                debug!("{:?} recorder error while {:?}: {}", slot, status, message);
                let state = self.state_mut(slot);
                state.status = match status {
                    SlotStatus::Starting | SlotStatus::Stopping => SlotStatus::Idle,
                    SlotStatus::Pausing => SlotStatus::Recording,
                    SlotStatus::Resuming => SlotStatus::Paused,
                    other => other,
                };
            }
            RecorderEvent::Chunk(_) => {}
        }
        effects.extend(self.pump());
        effects
    }

    /// Issue queued starts whose slot and peer allow it
    fn pump(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        for slot in [RecorderSlot::Segment, RecorderSlot::Challenge] {
            if self.status(slot) != SlotStatus::Idle || self.state(slot).queued.is_none() {
                continue;
            }
            let other = other_slot(slot);
            match self.status(other) {
                SlotStatus::Idle | SlotStatus::Paused => {
                    let state = self.state_mut(slot);
                    if let Some(options) = state.queued.take() {
                        state.status = SlotStatus::Starting;
                        effects.push(Effect::recorder(slot, RecorderCommand::Start(options)));
                    }
                }
                SlotStatus::Recording => {
                    debug!("{:?} recorder yields to {:?}", other, slot);
                    self.state_mut(other).yielded = true;
                    effects.extend(self.pause(other));
                }
                _ => {}
            }
        }
        effects
    }

    /// Started or running: frames may be written
    fn writing(&self, slot: RecorderSlot) -> bool {
        matches!(
            self.status(slot),
            SlotStatus::Starting | SlotStatus::Recording | SlotStatus::Resuming | SlotStatus::Pausing
        )
    }

    fn state(&self, slot: RecorderSlot) -> &SlotState {
        match slot {
            RecorderSlot::Segment => &self.segment,
            RecorderSlot::Challenge => &self.challenge,
        }
    }

    fn state_mut(&mut self, slot: RecorderSlot) -> &mut SlotState {
        match slot {
            RecorderSlot::Segment => &mut self.segment,
            RecorderSlot::Challenge => &mut self.challenge,
        }
    }
}

fn other_slot(slot: RecorderSlot) -> RecorderSlot {
    match slot {
        RecorderSlot::Segment => RecorderSlot::Challenge,
        RecorderSlot::Challenge => RecorderSlot::Segment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(slot: RecorderSlot) -> RecordingOptions {
        RecordingOptions {
            slot,
            segment: 0,
            resume_from: 0,
        }
    }

    fn commands(effects: &[Effect]) -> Vec<(RecorderSlot, &'static str)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Recorder { slot, command } => Some((
                    *slot,
                    match command {
                        RecorderCommand::Start(_) => "start",
                        RecorderCommand::Pause => "pause",
                        RecorderCommand::Resume => "resume",
                        RecorderCommand::Stop => "stop",
                    },
                )),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_start_from_idle() {
        let mut slots = RecorderSlots::new();
        let effects = slots.start(options(RecorderSlot::Segment));
        assert_eq!(commands(&effects), vec![(RecorderSlot::Segment, "start")]);
        assert_eq!(slots.status(RecorderSlot::Segment), SlotStatus::Starting);

        slots.on_event(RecorderSlot::Segment, &RecorderEvent::Started);
        assert_eq!(slots.status(RecorderSlot::Segment), SlotStatus::Recording);
    }

    #[test]
    fn test_challenge_waits_for_segment_pause() {
        let mut slots = RecorderSlots::new();
        slots.start(options(RecorderSlot::Segment));
        slots.on_event(RecorderSlot::Segment, &RecorderEvent::Started);

        let effects = slots.start(options(RecorderSlot::Challenge));
        assert_eq!(commands(&effects), vec![(RecorderSlot::Segment, "pause")]);
        assert_eq!(slots.status(RecorderSlot::Challenge), SlotStatus::Idle);
        assert!(slots.has_queued_start(RecorderSlot::Challenge));

        let effects = slots.on_event(RecorderSlot::Segment, &RecorderEvent::Paused);
        assert_eq!(commands(&effects), vec![(RecorderSlot::Challenge, "start")]);
        slots.on_event(RecorderSlot::Challenge, &RecorderEvent::Started);

        slots.stop(RecorderSlot::Challenge);
        let effects = slots.on_event(RecorderSlot::Challenge, &RecorderEvent::Stopped);
        assert_eq!(commands(&effects), vec![(RecorderSlot::Segment, "resume")]);
    }

    #[test]
    fn test_start_while_stopping_is_deferred() {
        let mut slots = RecorderSlots::new();
        slots.start(options(RecorderSlot::Challenge));
        slots.on_event(RecorderSlot::Challenge, &RecorderEvent::Started);
        slots.stop(RecorderSlot::Challenge);

        let effects = slots.start(options(RecorderSlot::Challenge));
        assert!(commands(&effects).is_empty());

        let effects = slots.on_event(RecorderSlot::Challenge, &RecorderEvent::Stopped);
        assert_eq!(commands(&effects), vec![(RecorderSlot::Challenge, "start")]);
    }

    #[test]
    fn test_resume_refused_while_other_records() {
        let mut slots = RecorderSlots::new();
        slots.start(options(RecorderSlot::Segment));
        slots.on_event(RecorderSlot::Segment, &RecorderEvent::Started);
        slots.pause(RecorderSlot::Segment);
        slots.on_event(RecorderSlot::Segment, &RecorderEvent::Paused);

        slots.start(options(RecorderSlot::Challenge));
        slots.on_event(RecorderSlot::Challenge, &RecorderEvent::Started);
        assert!(slots.resume(RecorderSlot::Segment).is_empty());
    }

    #[test]
    fn test_failed_start_returns_to_idle() {
        let mut slots = RecorderSlots::new();
        slots.start(options(RecorderSlot::Segment));
        slots.on_event(RecorderSlot::Segment, &RecorderEvent::Error("no encoder".into()));
        assert_eq!(slots.status(RecorderSlot::Segment), SlotStatus::Idle);
    }

    #[test]
    fn test_stop_idle_clears_queue() {
        let mut slots = RecorderSlots::new();
        slots.start(options(RecorderSlot::Segment));
        slots.on_event(RecorderSlot::Segment, &RecorderEvent::Started);
        slots.start(options(RecorderSlot::Challenge));
        assert!(slots.has_queued_start(RecorderSlot::Challenge));

        assert!(slots.stop(RecorderSlot::Challenge).is_empty());
        assert!(!slots.has_queued_start(RecorderSlot::Challenge));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Start(RecorderSlot),
            Pause(RecorderSlot),
            Resume(RecorderSlot),
            Stop(RecorderSlot),
            Ack(RecorderSlot),
        }

        fn slot() -> impl Strategy<Value = RecorderSlot> {
            prop_oneof![Just(RecorderSlot::Segment), Just(RecorderSlot::Challenge)]
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                slot().prop_map(Op::Start),
                slot().prop_map(Op::Pause),
                slot().prop_map(Op::Resume),
                slot().prop_map(Op::Stop),
                slot().prop_map(Op::Ack),
            ]
        }

        /// Acknowledge whatever the slot is waiting for, like a well-behaved recorder
        fn ack(slots: &mut RecorderSlots, slot: RecorderSlot) {
            let event = match slots.status(slot) {
                SlotStatus::Starting => RecorderEvent::Started,
                SlotStatus::Pausing => RecorderEvent::Paused,
                SlotStatus::Resuming => RecorderEvent::Resumed,
                SlotStatus::Stopping => RecorderEvent::Stopped,
                _ => return,
            };
            slots.on_event(slot, &event);
        }

        proptest! {
            #[test]
            fn never_two_writers(ops in prop::collection::vec(op(), 1..60)) {
                let mut slots = RecorderSlots::new();
                for op in ops {
                    match op {
                        Op::Start(s) => { slots.start(options(s)); }
                        Op::Pause(s) => { slots.pause(s); }
                        Op::Resume(s) => { slots.resume(s); }
                        Op::Stop(s) => { slots.stop(s); }
                        Op::Ack(s) => ack(&mut slots, s),
                    }
                    let both = slots.writing(RecorderSlot::Segment)
                        && slots.writing(RecorderSlot::Challenge);
                    prop_assert!(!both);
                }
            }
        }
    }
}
