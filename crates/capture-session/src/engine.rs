//! Async capture engine
//!
//! Drives a [`SessionController`] from a refresh-rate ticker. Each tick pulls
//! the latest camera frame, feeds both recorders, runs the sub-sampled
//! analyzers and delivers the result as one observation. Recorder lifecycle
//! events arrive on an mpsc channel and are handled between ticks, so the
//! controller only ever runs on this task.

use std::collections::VecDeque;
use std::time::Duration;

use camera_capture::{CaptureMonitor, FaceGuide, FrameSource, VideoFrame};
use face_tracking::{Descriptor, FaceLocator};
use frame_quality::QualityAnalyzer;
use segment_recorder::{
    ArtifactBundle, RecorderEvent, RecorderEvents, RecorderSink, RecorderSlot, SlotEvent,
};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::controller::SessionController;
use crate::event::{Effect, Event, Observation, RecorderCommand, StatusUpdate};
use crate::scheduler::{DetectionLoop, LoopAction, TickPlan};
use crate::SessionError;

/// How a session run ended
#[derive(Debug)]
pub enum SessionOutcome {
    Completed(Box<ArtifactBundle>),
    /// Camera stream ended before completion
    Halted,
}

enum Wake {
    Refresh,
    Recorder(SlotEvent),
}

/// Capture engine over a frame source, a face locator and two recorders
pub struct CaptureEngine<S: FrameSource, L: FaceLocator> {
    source: S,
    locator: L,
    segment_recorder: Box<dyn RecorderSink>,
    challenge_recorder: Box<dyn RecorderSink>,

    controller: SessionController,
    analyzer: QualityAnalyzer,
    guide: FaceGuide,
    monitor: CaptureMonitor,
    detection: DetectionLoop,
    refresh: Duration,

    events_tx: mpsc::UnboundedSender<SlotEvent>,
    events_rx: mpsc::UnboundedReceiver<SlotEvent>,
    status_tx: Option<mpsc::UnboundedSender<StatusUpdate>>,

    last_frame: Option<VideoFrame>,
    pending: VecDeque<Event>,
    started: Instant,
    outcome: Option<SessionOutcome>,
}

impl<S: FrameSource, L: FaceLocator> CaptureEngine<S, L> {
    pub fn new(
        config: SessionConfig,
        source: S,
        locator: L,
        segment_recorder: Box<dyn RecorderSink>,
        challenge_recorder: Box<dyn RecorderSink>,
    ) -> Result<Self, SessionError> {
        let controller = SessionController::new(config.clone())?;
        Self::with_controller(config, controller, source, locator, segment_recorder, challenge_recorder)
    }

    /// Build around an existing controller (e.g. one with a fixed plan)
    pub fn with_controller(
        config: SessionConfig,
        controller: SessionController,
        source: S,
        locator: L,
        segment_recorder: Box<dyn RecorderSink>,
        challenge_recorder: Box<dyn RecorderSink>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let analyzer = QualityAnalyzer::new(config.quality.clone())?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            source,
            locator,
            segment_recorder,
            challenge_recorder,
            controller,
            analyzer,
            guide: FaceGuide::new(config.guide.clone()),
            monitor: CaptureMonitor::new(config.capture.clone()),
            detection: DetectionLoop::new(&config.detection),
            refresh: Duration::from_secs_f32(1.0 / config.detection.refresh_hz),
            events_tx,
            events_rx,
            status_tx: None,
            last_frame: None,
            pending: VecDeque::new(),
            started: Instant::now(),
            outcome: None,
        })
    }

    /// Forward every published status update to `tx`
    pub fn with_status_channel(mut self, tx: mpsc::UnboundedSender<StatusUpdate>) -> Self {
        self.status_tx = Some(tx);
        self
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Run until the session completes, the camera stops or a fatal camera
    /// error occurs
    pub async fn run(mut self) -> Result<SessionOutcome, SessionError> {
        self.started = Instant::now();
        info!(
            "Capture engine started: refresh {:?}, session {}",
            self.refresh,
            self.controller.session_id()
        );
        if let Some(warning) = self.monitor.check_capabilities(&self.source.capabilities()) {
            self.dispatch(Event::CaptureWarning(warning));
        }

        let mut ticker = tokio::time::interval(self.refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let wake = tokio::select! {
                _ = ticker.tick() => Wake::Refresh,
                Some(event) = self.events_rx.recv() => Wake::Recorder(event),
            };
            match wake {
                Wake::Refresh => self.on_refresh()?,
                Wake::Recorder((slot, event)) => self.dispatch(Event::Recorder { slot, event }),
            }

            if let Some(outcome) = self.outcome.take() {
                info!("Capture engine finished: {}", outcome_name(&outcome));
                return Ok(outcome);
            }
        }
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn on_refresh(&mut self) -> Result<(), SessionError> {
        let active = self.source.is_active();
        if active {
            self.pull_frame()?;
        }

        match self.detection.tick(active, self.guide.is_initialized()) {
            LoopAction::Halt => self.dispatch(Event::CameraStopped),
            LoopAction::Reschedule => {}
            LoopAction::Run(plan) => self.run_tick(plan),
        }
        self.dispatch(Event::Clock);
        Ok(())
    }

    fn pull_frame(&mut self) -> Result<(), SessionError> {
        let frame = match self.source.current_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(e) if e.is_fatal() => {
                error!("Fatal camera error: {}", e);
                self.source.stop();
                return Err(e.into());
            }
            Err(e) => {
                warn!("Camera error: {}", e);
                return Ok(());
            }
        };

        if let Some(warning) = self.monitor.record_frame(frame.timestamp_ns) {
            self.dispatch(Event::CaptureWarning(warning));
        }
        self.guide.observe_dimensions(frame.width, frame.height);

        for slot in [RecorderSlot::Segment, RecorderSlot::Challenge] {
            if let Err(e) = self.sink(slot).write_frame(&frame) {
                warn!("{:?} recorder rejected frame {}: {}", slot, frame.sequence, e);
                self.pending.push_back(Event::Recorder {
                    slot,
                    event: RecorderEvent::Error(e.to_string()),
                });
            }
        }
        self.last_frame = Some(frame);
        Ok(())
    }

    fn run_tick(&mut self, plan: TickPlan) {
        let (Some(frame), Some(guide)) = (self.last_frame.as_ref(), self.guide.geometry().copied()) else {
            return;
        };

        let quality = if plan.run_quality {
            match self.analyzer.analyze(frame, &guide) {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!("Quality analysis skipped: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let locator = if plan.run_locator {
            match self.locator.locate(frame) {
                Ok(output) => Some(output),
                Err(e) => {
                    warn!("Face locator failed on frame {}: {}", plan.frame_index, e);
                    None
                }
            }
        } else {
            None
        };

        let observation = Observation {
            guide,
            quality,
            low_frame_rate: plan.run_quality && self.monitor.low_frame_rate(),
            locator,
        };
        self.dispatch(Event::Observation(observation));
    }

    /// Feed an event and everything it causes through the controller
    fn dispatch(&mut self, event: Event) {
        self.pending.push_back(event);
        while let Some(event) = self.pending.pop_front() {
            let now = self.now_ms();
            for effect in self.controller.handle(now, event) {
                self.apply(effect);
            }
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Recorder { slot, command } => self.command(slot, command),
            Effect::CaptureReference => {
                let descriptor = self.describe_current();
                self.pending.push_back(Event::ReferenceCaptured(descriptor));
            }
            Effect::CheckIdentity { reference } => {
                let distance = self
                    .describe_current()
                    .map(|current| self.locator.distance(&reference, &current));
                self.pending.push_back(Event::IdentitySample { distance });
            }
            Effect::Status(update) => {
                info!("[{:?}] {}", update.key, update.message);
                if let Some(tx) = &self.status_tx {
                    if tx.send(update).is_err() {
                        debug!("Status receiver dropped");
                        self.status_tx = None;
                    }
                }
            }
            Effect::ArtifactStored { kind, segment } => {
                debug!("Stored {:?} artifact for segment {}", kind, segment + 1);
            }
            Effect::SessionCompleted(bundle) => {
                self.outcome = Some(SessionOutcome::Completed(bundle));
            }
            Effect::Halt => {
                self.source.stop();
                self.outcome = Some(SessionOutcome::Halted);
            }
        }
    }

    fn command(&mut self, slot: RecorderSlot, command: RecorderCommand) {
        let events = RecorderEvents::new(slot, self.events_tx.clone());
        let sink = self.sink(slot);
        let result = match &command {
            RecorderCommand::Start(options) => sink.start(options, events),
            RecorderCommand::Pause => sink.pause(),
            RecorderCommand::Resume => sink.resume(),
            RecorderCommand::Stop => sink.stop(),
        };
        if let Err(e) = result {
            warn!("{:?} recorder failed to {:?}: {}", slot, command, e);
            self.pending.push_back(Event::Recorder {
                slot,
                event: RecorderEvent::Error(e.to_string()),
            });
        }
    }

    fn describe_current(&mut self) -> Option<Descriptor> {
        let frame = self.last_frame.as_ref()?;
        match self.locator.describe(frame) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("Descriptor extraction failed: {}", e);
                None
            }
        }
    }

    fn sink(&mut self, slot: RecorderSlot) -> &mut dyn RecorderSink {
        match slot {
            RecorderSlot::Segment => self.segment_recorder.as_mut(),
            RecorderSlot::Challenge => self.challenge_recorder.as_mut(),
        }
    }
}

fn outcome_name(outcome: &SessionOutcome) -> &'static str {
    match outcome {
        SessionOutcome::Completed(_) => "completed",
        SessionOutcome::Halted => "halted",
    }
}
