//! Session state machine
//!
//! `SessionController` owns every piece of mutable session state. It is fed
//! [`Event`]s stamped with the session clock and answers with [`Effect`]s;
//! it never blocks and never talks to a device directly. Logical timers live
//! in a [`TimerQueue`] and fire on [`Event::Clock`].

use camera_capture::GuideGeometry;
use chrono::Utc;
use face_tracking::{
    AlignmentEvaluator, Descriptor, FaceDetection, Guidance, IdentityChecker, IdentityVerdict,
    LocatorOutput,
};
use frame_quality::QualityIssue;
use liveness::{ChallengeDirection, ChallengeStep, ChallengeTracker, FailureAction, VerificationPolicy};
use rand::rngs::StdRng;
use rand::SeedableRng;
use segment_recorder::{
    ArtifactBundle, ArtifactKind, ChallengeClip, Chunk, PartialArtifact, RecorderEvent, RecorderSlot,
    RecordingOptions, SegmentArtifact, SegmentPlan, SegmentRecordingState, StopOutcome,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::event::{Effect, Event, Observation, StatusKey};
use crate::slots::{RecorderSlots, SlotStatus};
use crate::status::StatusBoard;
use crate::timers::{TimerKind, TimerQueue};
use crate::SessionError;

/// Poll interval while a restart waits for the segment recorder to stop
const RESTART_POLL_MS: u64 = 100;

/// Top-level session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Waiting for a stable face inside the guide
    AwaitingAlignment,
    /// Reference descriptor requested
    CapturingReference,
    /// Recording the current segment (including restarts and retries)
    Recording,
    /// Short pause before the next segment
    Advancing,
    /// Liveness challenge in progress
    Verifying,
    Completed,
    /// Camera stopped
    Halted,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Halted)
    }

    /// Phases in which a reference face is being tracked
    fn tracks_identity(&self) -> bool {
        matches!(
            self,
            SessionPhase::Recording | SessionPhase::Advancing | SessionPhase::Verifying
        )
    }
}

#[derive(Debug, Clone)]
struct ActiveChallenge {
    tracker: ChallengeTracker,
    segment: usize,
    attempt: u32,
}

#[derive(Debug, Clone)]
struct ClipCapture {
    segment: usize,
    direction: ChallengeDirection,
    attempt: u32,
    chunks: Vec<Chunk>,
}

/// Liveness capture session controller
pub struct SessionController {
    config: SessionConfig,
    rng: StdRng,
    now_ms: u64,
    session_id: Uuid,
    phase: SessionPhase,
    plan: SegmentPlan,
    segment_index: usize,

    recording: SegmentRecordingState,
    slots: RecorderSlots,
    timers: TimerQueue,
    status: StatusBoard,

    alignment: AlignmentEvaluator,
    identity: IdentityChecker,
    policy: VerificationPolicy,

    challenge: Option<ActiveChallenge>,
    clip: Option<ClipCapture>,
    keep_clip: bool,
    success_pending: bool,

    reference: Option<Descriptor>,
    identity_pending: bool,
    last_identity_ms: Option<u64>,
    restart_cooldown: bool,
    latest_detection: Option<FaceDetection>,
    guide: Option<GuideGeometry>,

    deferred_start: Option<u32>,
    retry_from: u32,
    discard_segment_stop: bool,

    segments: Vec<SegmentArtifact>,
    partials: Vec<PartialArtifact>,
    clips: Vec<ChallengeClip>,
}

impl SessionController {
    /// Create a controller with a freshly generated segment plan
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let mut rng = seeded_rng(config.seed);
        let plan = SegmentPlan::generate(config.total_seconds, &mut rng)?;
        Self::build(config, plan, rng)
    }

    /// Create a controller with a fixed first plan. Later plans (after a
    /// session reset) are generated.
    pub fn with_plan(config: SessionConfig, plan: SegmentPlan) -> Result<Self, SessionError> {
        config.validate()?;
        if plan.total() != config.total_seconds {
            return Err(SessionError::Config(format!(
                "plan covers {}s but the session total is {}s",
                plan.total(),
                config.total_seconds
            )));
        }
        let rng = seeded_rng(config.seed);
        Self::build(config, plan, rng)
    }

    fn build(config: SessionConfig, plan: SegmentPlan, rng: StdRng) -> Result<Self, SessionError> {
        let policy = VerificationPolicy::new(&config.challenge)?;
        let session_id = Uuid::new_v4();
        info!("Session {} created with plan {:?}", session_id, plan.targets());

        Ok(Self {
            rng,
            now_ms: 0,
            session_id,
            phase: SessionPhase::AwaitingAlignment,
            plan,
            segment_index: 0,
            recording: SegmentRecordingState::new(),
            slots: RecorderSlots::new(),
            timers: TimerQueue::new(),
            status: StatusBoard::new(config.timing.status_cooldown_ms),
            alignment: AlignmentEvaluator::new(config.alignment.clone()),
            identity: IdentityChecker::new(config.identity.clone()),
            policy,
            challenge: None,
            clip: None,
            keep_clip: false,
            success_pending: false,
            reference: None,
            identity_pending: false,
            last_identity_ms: None,
            restart_cooldown: false,
            latest_detection: None,
            guide: None,
            deferred_start: None,
            retry_from: 0,
            discard_segment_stop: false,
            segments: Vec::new(),
            partials: Vec::new(),
            clips: Vec::new(),
            config,
        })
    }

    /// Process one event at `now_ms` on the session clock
    pub fn handle(&mut self, now_ms: u64, event: Event) -> Vec<Effect> {
        let mut fx = Vec::new();
        if self.phase.is_terminal() {
            return fx;
        }
        self.now_ms = self.now_ms.max(now_ms);

        match event {
            Event::Observation(observation) => self.on_observation(observation, &mut fx),
            Event::Clock => self.on_clock(&mut fx),
            Event::Recorder { slot, event } => self.on_recorder(slot, event, &mut fx),
            Event::ReferenceCaptured(descriptor) => self.on_reference(descriptor, &mut fx),
            Event::IdentitySample { distance } => self.on_identity(distance, &mut fx),
            Event::CaptureWarning(warning) => {
                warn!("Capture warning: {}", warning.message());
                self.publish(StatusKey::Camera, warning.message(), &mut fx);
            }
            Event::CameraStopped => self.halt(&mut fx),
        }
        fx
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn plan(&self) -> &SegmentPlan {
        &self.plan
    }

    /// Current segment (0-based)
    pub fn segment_index(&self) -> usize {
        self.segment_index
    }

    pub fn recording(&self) -> &SegmentRecordingState {
        &self.recording
    }

    pub fn slots(&self) -> &RecorderSlots {
        &self.slots
    }

    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    pub fn restart_cooling_down(&self) -> bool {
        self.restart_cooldown
    }

    /// Direction of the challenge in flight
    pub fn active_challenge(&self) -> Option<ChallengeDirection> {
        self.challenge.as_ref().map(|c| c.tracker.direction())
    }

    pub fn segments(&self) -> &[SegmentArtifact] {
        &self.segments
    }

    pub fn partials(&self) -> &[PartialArtifact] {
        &self.partials
    }

    pub fn clips(&self) -> &[ChallengeClip] {
        &self.clips
    }

    /// Earliest pending timer, for drivers that sleep between events
    pub fn next_timer(&self) -> Option<u64> {
        self.timers.next_due()
    }

    // ---- observations ----

    fn on_observation(&mut self, observation: Observation, fx: &mut Vec<Effect>) {
        self.guide = Some(observation.guide);

        let issue = observation
            .quality
            .as_ref()
            .and_then(|report| report.primary_issue())
            .or(observation.low_frame_rate.then_some(QualityIssue::LowFrameRate));
        if let Some(issue) = issue {
            self.publish(StatusKey::Quality, issue.message(), fx);
            self.request_restart(issue.message(), fx);
            return;
        }

        let Some(output) = observation.locator else {
            return;
        };
        self.latest_detection = output.primary.clone();

        match self.phase {
            SessionPhase::AwaitingAlignment => self.align_before_start(&output, &observation.guide, fx),
            phase if phase.tracks_identity() => self.align_while_capturing(&output, &observation.guide, fx),
            _ => {}
        }
    }

    fn align_before_start(&mut self, output: &LocatorOutput, guide: &GuideGeometry, fx: &mut Vec<Effect>) {
        let verdict = self.alignment.evaluate(output, guide);
        self.publish(StatusKey::Alignment, verdict.guidance.message(), fx);
        if verdict.newly_accepted {
            self.on_alignment_accepted();
        }
        if verdict.accepted {
            info!("Face aligned, capturing reference descriptor");
            self.phase = SessionPhase::CapturingReference;
            fx.push(Effect::CaptureReference);
        }
    }

    fn align_while_capturing(&mut self, output: &LocatorOutput, guide: &GuideGeometry, fx: &mut Vec<Effect>) {
        let verdict = self.alignment.evaluate(output, guide);
        self.publish(StatusKey::Alignment, verdict.guidance.message(), fx);
        if verdict.newly_accepted {
            self.on_alignment_accepted();
        }

        match verdict.guidance {
            Guidance::NoFace | Guidance::MultipleFaces => {
                self.request_restart(verdict.guidance.message(), fx);
            }
            _ if verdict.accepted => self.request_identity_check(false, fx),
            _ => {}
        }
    }

    fn on_alignment_accepted(&mut self) {
        self.identity.reset();
        self.restart_cooldown = false;
    }

    // ---- timers ----

    fn on_clock(&mut self, fx: &mut Vec<Effect>) {
        while let Some(kind) = self.timers.pop_due(self.now_ms) {
            self.on_timer(kind, fx);
            if self.phase.is_terminal() {
                break;
            }
        }
    }

    fn on_timer(&mut self, kind: TimerKind, fx: &mut Vec<Effect>) {
        debug!("Timer {:?} fired at {}ms", kind, self.now_ms);
        match kind {
            TimerKind::SegmentTick => self.on_segment_tick(fx),
            TimerKind::RestartDelay => self.on_restart_delay(fx),
            TimerKind::Retry => {
                if self.phase == SessionPhase::Recording {
                    self.start_segment(self.retry_from, fx);
                }
            }
            TimerKind::Advance => self.on_advance(fx),
            TimerKind::ChallengeSample => self.on_challenge_sample(fx),
            TimerKind::ChallengeTimeout => {
                if let Some(active) = self.challenge.as_mut() {
                    let step = active.tracker.time_out();
                    self.apply_challenge_step(step, fx);
                }
            }
        }
    }

    fn schedule(&mut self, kind: TimerKind, delay_ms: u64) {
        self.timers.schedule(kind, self.now_ms + delay_ms);
    }

    // ---- segment recording ----

    fn start_segment(&mut self, resume_from: u32, fx: &mut Vec<Effect>) {
        match self.slots.status(RecorderSlot::Segment) {
            SlotStatus::Idle => {}
            SlotStatus::Stopping => {
                debug!("Segment recorder still stopping, start from {}s deferred", resume_from);
                self.deferred_start = Some(resume_from);
                return;
            }
            status => {
                debug!("Segment recorder already {:?}, start ignored", status);
                return;
            }
        }
        let Some(target) = self.plan.target(self.segment_index) else {
            warn!("No target for segment {}", self.segment_index + 1);
            return;
        };

        info!(
            "Starting segment {}/{} at {}s of {}s",
            self.segment_index + 1,
            self.plan.len(),
            resume_from,
            target
        );
        self.recording.begin(self.segment_index, target, resume_from);
        fx.extend(self.slots.start(RecordingOptions {
            slot: RecorderSlot::Segment,
            segment: self.segment_index,
            resume_from,
        }));
        self.schedule(TimerKind::SegmentTick, self.config.timing.segment_tick_ms);
        let message = format!("Recording part {} of {}", self.segment_index + 1, self.plan.len());
        self.publish(StatusKey::Recording, message, fx);
    }

    fn on_segment_tick(&mut self, fx: &mut Vec<Effect>) {
        if self.phase != SessionPhase::Recording {
            return;
        }
        let face_present = self.latest_detection.is_some();

        match self.slots.status(RecorderSlot::Segment) {
            SlotStatus::Recording if !face_present => {
                debug!("No face on segment tick, pausing recorder");
                self.recording.mark_paused();
                fx.extend(self.slots.pause(RecorderSlot::Segment));
                self.publish(StatusKey::Recording, "Paused. Bring your face back into the circle", fx);
            }
            SlotStatus::Recording => {
                let outcome = self.recording.tick();
                if outcome.advanced() {
                    self.request_identity_check(true, fx);
                }
                if outcome.should_stop() {
                    info!(
                        "Segment {} reached {}s, stopping recorder",
                        self.segment_index + 1,
                        self.recording.elapsed()
                    );
                    fx.extend(self.slots.stop(RecorderSlot::Segment));
                    return;
                }
            }
            SlotStatus::Paused => {
                if face_present {
                    fx.extend(self.slots.resume(RecorderSlot::Segment));
                }
            }
            SlotStatus::Stopping => return,
            SlotStatus::Idle if !self.slots.has_queued_start(RecorderSlot::Segment) => return,
            _ => {}
        }
        self.schedule(TimerKind::SegmentTick, self.config.timing.segment_tick_ms);
    }

    /// Face loss or a quality problem while a segment records
    fn request_restart(&mut self, reason: &str, fx: &mut Vec<Effect>) {
        if self.phase != SessionPhase::Recording || self.challenge.is_some() || self.restart_cooldown {
            return;
        }
        match self.slots.status(RecorderSlot::Segment) {
            SlotStatus::Stopping => return,
            SlotStatus::Idle => {}
            _ => {
                self.recording.mark_restarting();
                fx.extend(self.slots.stop(RecorderSlot::Segment));
            }
        }

        warn!(
            "Restarting segment {} at {}s: {}",
            self.segment_index + 1,
            self.recording.elapsed(),
            reason
        );
        self.restart_cooldown = true;
        self.deferred_start = None;
        self.timers.cancel(TimerKind::SegmentTick);
        self.timers.cancel(TimerKind::Retry);
        self.schedule(TimerKind::RestartDelay, self.config.timing.restart_delay_ms);
        self.publish(StatusKey::Recording, "Recording interrupted. It will continue shortly", fx);
    }

    fn on_restart_delay(&mut self, fx: &mut Vec<Effect>) {
        if self.phase != SessionPhase::Recording {
            self.restart_cooldown = false;
            return;
        }
        if !self.slots.status(RecorderSlot::Segment).is_idle() {
            self.schedule(TimerKind::RestartDelay, RESTART_POLL_MS);
            return;
        }
        self.restart_cooldown = false;
        let offset = self.recording.restart_offset();
        info!("Resuming segment {} from {}s", self.segment_index + 1, offset);
        self.start_segment(offset, fx);
    }

    fn on_recorder(&mut self, slot: RecorderSlot, event: RecorderEvent, fx: &mut Vec<Effect>) {
        fx.extend(self.slots.on_event(slot, &event));
        match slot {
            RecorderSlot::Segment => self.on_segment_event(event, fx),
            RecorderSlot::Challenge => self.on_challenge_event(event, fx),
        }
    }

    fn on_segment_event(&mut self, event: RecorderEvent, fx: &mut Vec<Effect>) {
        match event {
            RecorderEvent::Chunk(chunk) => self.recording.push_chunk(chunk),
            RecorderEvent::Stopped => self.on_segment_stopped(fx),
            RecorderEvent::Error(message) => {
                warn!("Segment recorder error: {}", message);
                self.publish(StatusKey::Recording, "Recording failed. Retrying", fx);
                self.recording.invalidate();
                if self.slots.status(RecorderSlot::Segment).is_idle() {
                    self.on_segment_stopped(fx);
                } else {
                    fx.extend(self.slots.stop(RecorderSlot::Segment));
                }
            }
            RecorderEvent::Started | RecorderEvent::Paused | RecorderEvent::Resumed => {}
        }
    }

    fn on_segment_stopped(&mut self, fx: &mut Vec<Effect>) {
        if self.discard_segment_stop {
            self.discard_segment_stop = false;
            self.recording.reset();
            debug!("Discarded recording from a previous session");
        } else {
            let segment = self.recording.segment();
            match self.recording.finish() {
                StopOutcome::Completed {
                    start_second,
                    end_second,
                    chunks,
                } => {
                    info!("Segment {} complete ({}s-{}s)", segment + 1, start_second, end_second);
                    self.segments.push(SegmentArtifact::new(
                        self.session_id,
                        segment,
                        start_second,
                        end_second,
                        chunks,
                    ));
                    fx.push(Effect::ArtifactStored {
                        kind: ArtifactKind::Segment,
                        segment,
                    });
                    self.on_segment_complete(segment, fx);
                }
                StopOutcome::Partial {
                    start_second,
                    end_second,
                    chunks,
                } => {
                    info!("Segment {} partial kept ({}s-{}s)", segment + 1, start_second, end_second);
                    self.partials.push(PartialArtifact::new(
                        self.session_id,
                        segment,
                        start_second,
                        end_second,
                        chunks,
                    ));
                    fx.push(Effect::ArtifactStored {
                        kind: ArtifactKind::Partial,
                        segment,
                    });
                }
                StopOutcome::Discarded => debug!("Interrupted run of segment {} had no data", segment + 1),
                StopOutcome::Retry { resume_from } => {
                    if self.phase == SessionPhase::Recording && !self.timers.is_scheduled(TimerKind::RestartDelay) {
                        info!("Segment {} incomplete, retrying from {}s", segment + 1, resume_from);
                        self.retry_from = resume_from;
                        self.schedule(TimerKind::Retry, self.config.timing.retry_delay_ms);
                    }
                }
            }
        }

        if let Some(offset) = self.deferred_start.take() {
            self.start_segment(offset, fx);
        }
    }

    fn on_segment_complete(&mut self, segment: usize, fx: &mut Vec<Effect>) {
        self.restart_cooldown = false;
        self.timers.cancel(TimerKind::SegmentTick);
        self.timers.cancel(TimerKind::RestartDelay);

        if self.policy.due_after(segment) {
            self.begin_verification(segment, fx);
        } else if self.plan.is_last(segment) {
            self.complete_session(fx);
        } else {
            self.advance_later();
        }
    }

    fn advance_later(&mut self) {
        self.phase = SessionPhase::Advancing;
        self.schedule(TimerKind::Advance, self.config.timing.advance_delay_ms);
    }

    fn on_advance(&mut self, fx: &mut Vec<Effect>) {
        if self.phase != SessionPhase::Advancing {
            return;
        }
        if self.plan.is_last(self.segment_index) {
            self.complete_session(fx);
            return;
        }
        self.segment_index += 1;
        self.phase = SessionPhase::Recording;
        self.start_segment(0, fx);
    }

    // ---- liveness verification ----

    fn begin_verification(&mut self, segment: usize, fx: &mut Vec<Effect>) {
        self.phase = SessionPhase::Verifying;
        let direction = self.policy.next_direction(&mut self.rng);
        let attempt = self.policy.attempts() + 1;
        info!(
            "Verification after segment {}: attempt {} asks for {:?}",
            segment + 1,
            attempt,
            direction
        );

        self.challenge = Some(ActiveChallenge {
            tracker: ChallengeTracker::new(direction, &self.config.challenge, self.now_ms),
            segment,
            attempt,
        });
        self.schedule(TimerKind::ChallengeSample, self.config.challenge.sample_interval_ms);
        self.schedule(TimerKind::ChallengeTimeout, self.config.challenge.timeout_ms);
        self.publish(StatusKey::Verification, direction.instruction(), fx);
    }

    fn on_challenge_sample(&mut self, fx: &mut Vec<Effect>) {
        let Some(guide) = self.guide else {
            self.schedule(TimerKind::ChallengeSample, self.config.challenge.sample_interval_ms);
            return;
        };
        let Some(active) = self.challenge.as_mut() else {
            return;
        };
        let step = active
            .tracker
            .sample(self.now_ms, self.latest_detection.as_ref(), &guide);
        self.apply_challenge_step(step, fx);
    }

    fn apply_challenge_step(&mut self, step: ChallengeStep, fx: &mut Vec<Effect>) {
        match step {
            ChallengeStep::Waiting => {
                self.schedule(TimerKind::ChallengeSample, self.config.challenge.sample_interval_ms);
            }
            ChallengeStep::BeginClip => {
                self.start_clip(fx);
                self.schedule(TimerKind::ChallengeSample, self.config.challenge.sample_interval_ms);
            }
            ChallengeStep::AbandonClip => {
                self.stop_clip(false, fx);
                self.schedule(TimerKind::ChallengeSample, self.config.challenge.sample_interval_ms);
            }
            ChallengeStep::Confirmed { .. } => {
                self.timers.cancel(TimerKind::ChallengeSample);
                self.timers.cancel(TimerKind::ChallengeTimeout);
                if self.clip.is_some() && self.slots.is_active(RecorderSlot::Challenge) {
                    self.success_pending = true;
                    self.stop_clip(true, fx);
                } else {
                    self.verification_passed(fx);
                }
            }
            ChallengeStep::Drifted | ChallengeStep::TimedOut { .. } => {
                self.stop_clip(false, fx);
                self.verification_failed(step, fx);
            }
        }
    }

    fn start_clip(&mut self, fx: &mut Vec<Effect>) {
        let Some(active) = &self.challenge else {
            return;
        };
        if self.slots.is_active(RecorderSlot::Challenge) || self.slots.has_queued_start(RecorderSlot::Challenge) {
            debug!("Challenge recorder busy, movement recorded without a clip");
            return;
        }
        let segment = active.segment;
        self.clip = Some(ClipCapture {
            segment,
            direction: active.tracker.direction(),
            attempt: active.attempt,
            chunks: Vec::new(),
        });
        self.keep_clip = false;
        fx.extend(self.slots.start(RecordingOptions {
            slot: RecorderSlot::Challenge,
            segment,
            resume_from: 0,
        }));
    }

    fn stop_clip(&mut self, keep: bool, fx: &mut Vec<Effect>) {
        if self.slots.is_active(RecorderSlot::Challenge) {
            self.keep_clip = keep;
            fx.extend(self.slots.stop(RecorderSlot::Challenge));
        } else {
            fx.extend(self.slots.stop(RecorderSlot::Challenge));
            self.clip = None;
        }
    }

    fn on_challenge_event(&mut self, event: RecorderEvent, fx: &mut Vec<Effect>) {
        match event {
            RecorderEvent::Chunk(chunk) => {
                if let Some(clip) = self.clip.as_mut() {
                    if !chunk.is_empty() {
                        clip.chunks.push(chunk);
                    }
                }
            }
            RecorderEvent::Stopped => self.on_clip_stopped(fx),
            RecorderEvent::Error(message) => {
                warn!("Challenge recorder error: {}", message);
                self.publish(StatusKey::Verification, "Could not record the movement clip", fx);
                self.keep_clip = false;
                if self.slots.status(RecorderSlot::Challenge).is_idle() {
                    self.on_clip_stopped(fx);
                } else {
                    fx.extend(self.slots.stop(RecorderSlot::Challenge));
                }
            }
            RecorderEvent::Started | RecorderEvent::Paused | RecorderEvent::Resumed => {}
        }
    }

    fn on_clip_stopped(&mut self, fx: &mut Vec<Effect>) {
        let clip = self.clip.take();
        if self.keep_clip {
            if let Some(clip) = clip.filter(|c| !c.chunks.is_empty()) {
                debug!(
                    "Keeping {:?} clip for segment {} ({} chunks)",
                    clip.direction,
                    clip.segment + 1,
                    clip.chunks.len()
                );
                self.clips.push(ChallengeClip::new(
                    self.session_id,
                    clip.segment,
                    clip.direction,
                    clip.attempt,
                    clip.chunks,
                ));
                fx.push(Effect::ArtifactStored {
                    kind: ArtifactKind::Challenge,
                    segment: clip.segment,
                });
            }
        }
        self.keep_clip = false;

        if self.success_pending {
            self.success_pending = false;
            self.verification_passed(fx);
        }
    }

    fn verification_passed(&mut self, fx: &mut Vec<Effect>) {
        let Some(active) = self.challenge.take() else {
            return;
        };
        self.policy.record_success(active.segment);
        self.publish(StatusKey::Verification, "Movement confirmed", fx);

        if self.plan.is_last(active.segment) {
            self.complete_session(fx);
        } else {
            self.advance_later();
        }
    }

    fn verification_failed(&mut self, step: ChallengeStep, fx: &mut Vec<Effect>) {
        let Some(active) = self.challenge.take() else {
            return;
        };
        self.timers.cancel(TimerKind::ChallengeSample);
        self.timers.cancel(TimerKind::ChallengeTimeout);
        info!(
            "Verification attempt {} after segment {} failed: {:?}",
            active.attempt,
            active.segment + 1,
            step
        );

        match self.policy.record_failure(active.segment) {
            FailureAction::Retry => {
                self.publish(StatusKey::Verification, "Movement not detected. Let's try again", fx);
                self.begin_verification(active.segment, fx);
            }
            FailureAction::Defer => {
                self.publish(
                    StatusKey::Verification,
                    "Movement not detected. We will ask again at the end",
                    fx,
                );
                self.advance_later();
            }
            FailureAction::ResetSession => self.reset_session("liveness verification failed", fx),
        }
    }

    // ---- identity ----

    fn on_reference(&mut self, descriptor: Option<Descriptor>, fx: &mut Vec<Effect>) {
        if self.phase != SessionPhase::CapturingReference {
            return;
        }
        if descriptor.is_none() {
            warn!("No reference descriptor available, identity checks disabled for this session");
        }
        self.reference = descriptor;
        self.phase = SessionPhase::Recording;
        self.segment_index = 0;
        info!("Session {} recording, plan {:?}", self.session_id, self.plan.targets());
        self.start_segment(0, fx);
    }

    /// Ask for a descriptor comparison. `forced` skips the interval throttle
    /// but never stacks a second request on an unanswered one.
    fn request_identity_check(&mut self, forced: bool, fx: &mut Vec<Effect>) {
        let Some(reference) = self.reference.clone() else {
            return;
        };
        if self.identity_pending {
            return;
        }
        if !forced {
            if let Some(last) = self.last_identity_ms {
                if self.now_ms.saturating_sub(last) < self.config.timing.identity_interval_ms {
                    return;
                }
            }
        }
        self.identity_pending = true;
        self.last_identity_ms = Some(self.now_ms);
        fx.push(Effect::CheckIdentity { reference });
    }

    fn on_identity(&mut self, distance: Option<f32>, fx: &mut Vec<Effect>) {
        self.identity_pending = false;
        if self.reference.is_none() || !self.phase.tracks_identity() {
            return;
        }
        match self.identity.observe(distance) {
            IdentityVerdict::Mismatch { .. } => {
                self.publish(
                    StatusKey::Identity,
                    "Face does not match. The same person must stay in view",
                    fx,
                );
            }
            IdentityVerdict::DifferentPerson { .. } => self.reset_session("different person detected", fx),
            IdentityVerdict::Match { .. } | IdentityVerdict::Neutral => {}
        }
    }

    // ---- session lifecycle ----

    fn stop_all_recorders(&mut self, fx: &mut Vec<Effect>) {
        if self.slots.is_active(RecorderSlot::Segment) {
            self.discard_segment_stop = true;
        }
        fx.extend(self.slots.stop(RecorderSlot::Segment));
        fx.extend(self.slots.stop(RecorderSlot::Challenge));
        self.clip = None;
        self.keep_clip = false;
        self.success_pending = false;
    }

    fn reset_session(&mut self, reason: &str, fx: &mut Vec<Effect>) {
        warn!("Resetting session {}: {}", self.session_id, reason);
        self.stop_all_recorders(fx);
        self.timers.cancel_all();

        self.recording.reset();
        self.alignment.reset();
        self.identity.reset();
        self.policy.reset();
        self.challenge = None;
        self.reference = None;
        self.identity_pending = false;
        self.last_identity_ms = None;
        self.restart_cooldown = false;
        self.deferred_start = None;
        self.retry_from = 0;
        self.segments.clear();
        self.partials.clear();
        self.clips.clear();

        match SegmentPlan::generate(self.config.total_seconds, &mut self.rng) {
            Ok(plan) => self.plan = plan,
            Err(e) => warn!("Keeping previous plan: {}", e),
        }
        self.session_id = Uuid::new_v4();
        self.segment_index = 0;
        self.phase = SessionPhase::AwaitingAlignment;
        info!("New session {} with plan {:?}", self.session_id, self.plan.targets());
        self.publish(
            StatusKey::Session,
            "Verification restarted. Center your face in the circle",
            fx,
        );
    }

    fn complete_session(&mut self, fx: &mut Vec<Effect>) {
        self.timers.cancel_all();
        fx.extend(self.slots.stop(RecorderSlot::Challenge));
        self.phase = SessionPhase::Completed;

        let bundle = ArtifactBundle {
            session_id: self.session_id,
            segments: std::mem::take(&mut self.segments),
            partials: std::mem::take(&mut self.partials),
            clips: std::mem::take(&mut self.clips),
            completed_at: Utc::now(),
        };
        info!(
            "Session {} complete: {} segments, {} partials, {} clips",
            bundle.session_id,
            bundle.segments.len(),
            bundle.partials.len(),
            bundle.clips.len()
        );
        self.publish(StatusKey::Session, "Verification recording complete", fx);
        fx.push(Effect::SessionCompleted(Box::new(bundle)));
    }

    fn halt(&mut self, fx: &mut Vec<Effect>) {
        info!("Camera stopped, halting session {}", self.session_id);
        self.stop_all_recorders(fx);
        self.timers.cancel_all();
        self.challenge = None;
        self.phase = SessionPhase::Halted;
        fx.push(Effect::Halt);
    }

    fn publish(&mut self, key: StatusKey, message: impl Into<String>, fx: &mut Vec<Effect>) {
        if let Some(update) = self.status.publish(self.now_ms, key, message) {
            fx.push(Effect::Status(update));
        }
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{RecorderCommand, StatusUpdate};
    use camera_capture::GuideConfig;
    use frame_quality::{BrightnessLevel, QualityReport};
    use std::collections::VecDeque;

    const STEP_MS: u64 = 16;

    /// Drives a controller with a scripted face and auto-acknowledging recorders
    struct Harness {
        controller: SessionController,
        now: u64,
        /// Nose offset of the visible face; `None` hides the face
        face: Option<(f32, f32)>,
        /// Offset of the face centre from the guide centre
        face_shift: (f32, f32),
        identity_distance: Option<f32>,
        statuses: Vec<StatusUpdate>,
        stored: Vec<(ArtifactKind, usize)>,
        completed: Option<Box<ArtifactBundle>>,
        halted: bool,
    }

    impl Harness {
        fn new(targets: [u32; 3]) -> Self {
            let config = SessionConfig {
                total_seconds: targets.iter().sum(),
                seed: Some(7),
                ..SessionConfig::standard()
            };
            let plan = SegmentPlan::from_targets(targets).unwrap();
            Self {
                controller: SessionController::with_plan(config, plan).unwrap(),
                now: 0,
                face: Some((0.0, 0.0)),
                face_shift: (0.0, 0.0),
                identity_distance: Some(0.2),
                statuses: Vec::new(),
                stored: Vec::new(),
                completed: None,
                halted: false,
            }
        }

        fn guide() -> GuideGeometry {
            GuideGeometry::from_dimensions(640, 480, &GuideConfig::default()).unwrap()
        }

        fn observation(&self, quality: Option<QualityReport>) -> Observation {
            let locator = match self.face {
                Some((dx, dy)) => {
                    let (sx, sy) = self.face_shift;
                    let mut detection = FaceDetection::synthetic(320.0 + sx, 240.0 + sy, 250.0);
                    detection.landmarks = detection.landmarks.with_nose_offset(dx, dy);
                    LocatorOutput {
                        faces: vec![detection.face],
                        primary: Some(detection),
                    }
                }
                None => LocatorOutput::default(),
            };
            Observation {
                guide: Self::guide(),
                quality,
                low_frame_rate: false,
                locator: Some(locator),
            }
        }

        fn send(&mut self, event: Event) {
            let mut queue = VecDeque::from([event]);
            while let Some(event) = queue.pop_front() {
                for effect in self.controller.handle(self.now, event) {
                    match effect {
                        Effect::Recorder { slot, command } => match command {
                            RecorderCommand::Start(_) => queue.push_back(Event::Recorder {
                                slot,
                                event: RecorderEvent::Started,
                            }),
                            RecorderCommand::Pause => queue.push_back(Event::Recorder {
                                slot,
                                event: RecorderEvent::Paused,
                            }),
                            RecorderCommand::Resume => queue.push_back(Event::Recorder {
                                slot,
                                event: RecorderEvent::Resumed,
                            }),
                            RecorderCommand::Stop => {
                                queue.push_back(Event::Recorder {
                                    slot,
                                    event: RecorderEvent::Chunk(Chunk::new(vec![0; 20])),
                                });
                                queue.push_back(Event::Recorder {
                                    slot,
                                    event: RecorderEvent::Stopped,
                                });
                            }
                        },
                        Effect::CaptureReference => {
                            queue.push_back(Event::ReferenceCaptured(Some(Descriptor::new(vec![0.0; 128]))))
                        }
                        Effect::CheckIdentity { .. } => queue.push_back(Event::IdentitySample {
                            distance: self.identity_distance,
                        }),
                        Effect::Status(update) => self.statuses.push(update),
                        Effect::ArtifactStored { kind, segment } => self.stored.push((kind, segment)),
                        Effect::SessionCompleted(bundle) => self.completed = Some(bundle),
                        Effect::Halt => self.halted = true,
                    }
                }
            }
        }

        fn step_with(&mut self, quality: Option<QualityReport>) {
            self.now += STEP_MS;
            let observation = self.observation(quality);
            self.send(Event::Observation(observation));
            self.send(Event::Clock);
        }

        fn step(&mut self) {
            self.step_with(None);
        }

        fn run_for(&mut self, ms: u64) {
            let end = self.now + ms;
            while self.now < end {
                self.step();
            }
        }

        fn run_until(&mut self, max_ms: u64, done: impl Fn(&SessionController) -> bool) -> bool {
            let end = self.now + max_ms;
            while self.now < end {
                if done(&self.controller) {
                    return true;
                }
                self.step();
            }
            done(&self.controller)
        }

        fn has_status(&self, key: StatusKey, message: &str) -> bool {
            self.statuses.iter().any(|s| s.key == key && s.message == message)
        }
    }

    /// Nose offsets crossing the near and the confirm threshold for a 250px face
    fn movement(direction: ChallengeDirection) -> ((f32, f32), (f32, f32)) {
        match direction {
            ChallengeDirection::Left => ((15.0, 0.0), (30.0, 0.0)),
            ChallengeDirection::Right => ((-15.0, 0.0), (-30.0, 0.0)),
            ChallengeDirection::Down => ((0.0, 13.5), (0.0, 20.0)),
            ChallengeDirection::Up => ((0.0, -13.5), (0.0, -20.0)),
        }
    }

    /// Hold still for a baseline, then move through near and confirm
    fn confirm_challenge(h: &mut Harness) -> ChallengeDirection {
        let direction = h.controller.active_challenge().unwrap();
        let (near, confirm) = movement(direction);
        h.run_for(160);
        h.face = Some(near);
        h.run_for(160);
        h.face = Some(confirm);
        h.run_for(160);
        h.face = Some((0.0, 0.0));
        direction
    }

    fn bright_report() -> QualityReport {
        QualityReport {
            brightness: 200.0,
            brightness_level: BrightnessLevel::TooBright,
            ..dark_report()
        }
    }

    fn dark_report() -> QualityReport {
        QualityReport {
            brightness: 40.0,
            brightness_level: BrightnessLevel::TooDark,
            blank_fraction: 0.0,
            blank: false,
            luminance_variance: 400.0,
            blurred: false,
            bright_spot: None,
        }
    }

    fn recording(c: &SessionController) -> bool {
        c.phase() == SessionPhase::Recording && c.slots().status(RecorderSlot::Segment) == SlotStatus::Recording
    }

    #[test]
    fn test_alignment_then_first_segment_then_challenge() {
        let mut h = Harness::new([2, 3, 5]);

        h.step();
        h.step();
        assert_eq!(h.controller.phase(), SessionPhase::AwaitingAlignment);
        h.step();
        assert!(h.controller.has_reference());
        assert!(recording(&h.controller));

        assert!(h.run_until(5_000, |c| c.phase() == SessionPhase::Verifying));
        assert_eq!(h.controller.segments().len(), 1);
        assert_eq!(h.controller.segments()[0].end_second, 2);
        assert_eq!(h.stored, vec![(ArtifactKind::Segment, 0)]);

        let direction = h.controller.active_challenge().unwrap();
        assert!(h.has_status(StatusKey::Verification, direction.instruction()));
        let (near, confirm) = movement(direction);

        // baseline sample
        h.run_for(160);
        assert_eq!(h.controller.slots().status(RecorderSlot::Challenge), SlotStatus::Idle);

        h.face = Some(near);
        h.run_for(160);
        assert_eq!(h.controller.slots().status(RecorderSlot::Challenge), SlotStatus::Recording);

        h.face = Some(confirm);
        h.run_for(160);
        assert_eq!(h.controller.clips().len(), 1);
        assert_eq!(h.controller.clips()[0].direction, direction);
        assert_eq!(h.controller.phase(), SessionPhase::Advancing);

        h.face = Some((0.0, 0.0));
        assert!(h.run_until(1_000, |c| c.segment_index() == 1));
        assert!(h.run_until(100, recording));
        assert_eq!(h.controller.recording().target(), 3);
    }

    #[test]
    fn test_face_loss_keeps_partial_and_resumes_one_second_back() {
        let mut h = Harness::new([3, 3, 4]);
        assert!(h.run_until(5_000, |c| c.recording().elapsed() == 2));

        h.face = None;
        h.step();
        assert_eq!(h.controller.partials().len(), 1);
        let partial = &h.controller.partials()[0];
        assert_eq!((partial.start_second, partial.end_second), (0, 2));
        assert!(h.controller.restart_cooling_down());

        // repeated loss inside the cooldown is dropped
        h.step();
        assert_eq!(h.controller.partials().len(), 1);

        h.face = Some((0.0, 0.0));
        assert!(h.run_until(2_000, recording));
        assert_eq!(h.controller.recording().elapsed(), 1);
        assert!(!h.controller.recording().is_clean());
    }

    #[test]
    fn test_repeated_restart_resumes_from_same_offset() {
        let mut h = Harness::new([3, 3, 4]);
        assert!(h.run_until(5_000, |c| c.recording().elapsed() == 2));
        h.face = None;
        h.step();
        h.face = Some((0.0, 0.0));
        assert!(h.run_until(2_000, recording));
        assert_eq!(h.controller.recording().elapsed(), 1);

        // lost again before another second is counted
        h.face = None;
        h.step();
        h.face = Some((0.0, 0.0));
        assert!(h.run_until(2_000, recording));
        assert_eq!(h.controller.recording().elapsed(), 1);
    }

    #[test]
    fn test_two_failed_attempts_after_first_segment_reset_session() {
        let mut h = Harness::new([2, 3, 5]);
        let first_session = h.controller.session_id();
        assert!(h.run_until(5_000, |c| c.phase() == SessionPhase::Verifying));
        let first_direction = h.controller.active_challenge().unwrap();

        // hold still through the first timeout
        assert!(h.run_until(31_000, |c| c.policy().attempts() == 1));
        assert_eq!(h.controller.phase(), SessionPhase::Verifying);
        let second_direction = h.controller.active_challenge().unwrap();
        assert_ne!(first_direction, second_direction);

        assert!(h.run_until(31_000, |c| c.phase() == SessionPhase::AwaitingAlignment));
        assert_ne!(h.controller.session_id(), first_session);
        assert!(h.controller.segments().is_empty());
        assert!(!h.controller.has_reference());
        assert_eq!(h.controller.policy().attempts(), 0);
        assert!(h.has_status(
            StatusKey::Session,
            "Verification restarted. Center your face in the circle"
        ));
    }

    #[test]
    fn test_dark_frame_restarts_despite_alignment() {
        let mut h = Harness::new([3, 3, 4]);
        assert!(h.run_until(5_000, |c| c.recording().elapsed() == 1));

        h.step_with(Some(dark_report()));
        assert!(h.has_status(StatusKey::Quality, QualityIssue::TooDark.message()));
        assert!(h.controller.restart_cooling_down());
        assert_eq!(h.controller.partials().len(), 1);
        assert_eq!(h.controller.slots().status(RecorderSlot::Segment), SlotStatus::Idle);
    }

    #[test]
    fn test_bright_frame_restarts_and_resumes() {
        let mut h = Harness::new([3, 3, 4]);
        assert!(h.run_until(5_000, |c| c.recording().elapsed() == 1));

        h.step_with(Some(bright_report()));
        assert!(h.has_status(StatusKey::Quality, QualityIssue::TooBright.message()));
        assert!(h.controller.restart_cooling_down());
        assert_eq!(h.controller.partials().len(), 1);
        assert_eq!(h.controller.slots().status(RecorderSlot::Segment), SlotStatus::Idle);

        assert!(h.run_until(2_000, recording));
        assert_eq!(h.controller.recording().elapsed(), 0);
        assert_eq!(h.controller.segment_index(), 0);
    }

    #[test]
    fn test_recorder_error_retries_segment() {
        let mut h = Harness::new([3, 3, 4]);
        assert!(h.run_until(5_000, |c| c.recording().elapsed() == 1));

        h.send(Event::Recorder {
            slot: RecorderSlot::Segment,
            event: RecorderEvent::Error("encoder lost".to_string()),
        });
        assert!(h.has_status(StatusKey::Recording, "Recording failed. Retrying"));
        assert_eq!(h.controller.slots().status(RecorderSlot::Segment), SlotStatus::Idle);
        assert!(!h.controller.recording().is_valid());
        assert!(h.controller.segments().is_empty());
        assert!(h.controller.partials().is_empty());

        assert!(h.run_until(1_000, recording));
        assert_eq!(h.controller.recording().elapsed(), 1);
        assert_eq!(h.controller.segment_index(), 0);

        assert!(h.run_until(5_000, |c| c.phase() == SessionPhase::Verifying));
        assert_eq!(h.controller.segments().len(), 1);
        assert_eq!(h.controller.segments()[0].end_second, 3);
    }

    #[test]
    fn test_drift_during_clip_fails_attempt() {
        let mut h = Harness::new([2, 3, 5]);
        assert!(h.run_until(5_000, |c| c.phase() == SessionPhase::Verifying));
        let first_direction = h.controller.active_challenge().unwrap();
        let (near, _) = movement(first_direction);

        h.run_for(160);
        h.face = Some(near);
        h.run_for(160);
        assert_eq!(h.controller.slots().status(RecorderSlot::Challenge), SlotStatus::Recording);

        // face centre well outside the 216px outer radius
        h.face_shift = (300.0, 0.0);
        h.run_for(160);
        assert!(h.has_status(StatusKey::Verification, "Movement not detected. Let's try again"));
        assert_eq!(h.controller.policy().attempts(), 1);
        assert_eq!(h.controller.phase(), SessionPhase::Verifying);
        assert_ne!(h.controller.active_challenge(), Some(first_direction));
        assert!(h.controller.clips().is_empty());
        assert_eq!(h.controller.slots().status(RecorderSlot::Challenge), SlotStatus::Idle);
    }

    /// Segment 1 verified, segment 2 verification exhausted and deferred,
    /// segment 3 recorded; leaves the deferred verification in flight
    fn reach_deferred_verification(h: &mut Harness) {
        assert!(h.run_until(5_000, |c| c.phase() == SessionPhase::Verifying));
        confirm_challenge(h);
        assert!(h.run_until(1_000, |c| c.segment_index() == 1));

        assert!(h.run_until(6_000, |c| c.phase() == SessionPhase::Verifying));
        assert_eq!(h.controller.segments().len(), 2);
        assert!(h.run_until(31_000, |c| c.policy().attempts() == 1));
        assert!(h.run_until(31_000, |c| c.phase() == SessionPhase::Advancing));
        assert!(h.controller.policy().is_deferred());
        assert!(h.has_status(
            StatusKey::Verification,
            "Movement not detected. We will ask again at the end"
        ));

        assert!(h.run_until(1_000, |c| c.segment_index() == 2));
        assert!(h.run_until(100, recording));
        assert_eq!(h.controller.recording().target(), 5);
        assert!(h.run_until(8_000, |c| c.phase() == SessionPhase::Verifying));
        assert_eq!(h.controller.segments().len(), 3);
        assert!(h.completed.is_none());
    }

    #[test]
    fn test_deferred_verification_completes_session() {
        let mut h = Harness::new([2, 3, 5]);
        reach_deferred_verification(&mut h);

        confirm_challenge(&mut h);
        assert_eq!(h.controller.phase(), SessionPhase::Completed);
        let bundle = h.completed.as_ref().unwrap();
        let segments: Vec<usize> = bundle.segments.iter().map(|s| s.segment).collect();
        assert_eq!(segments, vec![0, 1, 2]);
        let clip_segments: Vec<usize> = bundle.clips.iter().map(|c| c.segment).collect();
        assert_eq!(clip_segments, vec![0, 2]);
        assert!(!h.controller.policy().is_deferred());
    }

    #[test]
    fn test_exhausted_deferred_verification_resets_session() {
        let mut h = Harness::new([2, 3, 5]);
        let first_session = h.controller.session_id();
        reach_deferred_verification(&mut h);

        assert!(h.run_until(31_000, |c| c.policy().attempts() == 1));
        assert!(h.run_until(31_000, |c| c.phase() == SessionPhase::AwaitingAlignment));
        assert!(h.completed.is_none());
        assert!(h.controller.segments().is_empty());
        assert_ne!(h.controller.session_id(), first_session);
        assert!(!h.controller.policy().is_deferred());
    }

    #[test]
    fn test_quality_issue_during_challenge_does_not_restart() {
        let mut h = Harness::new([2, 3, 5]);
        assert!(h.run_until(5_000, |c| c.phase() == SessionPhase::Verifying));

        h.step_with(Some(dark_report()));
        assert!(!h.controller.restart_cooling_down());
        assert_eq!(h.controller.phase(), SessionPhase::Verifying);
    }

    #[test]
    fn test_sustained_mismatch_resets_session() {
        let mut h = Harness::new([3, 3, 4]);
        assert!(h.run_until(5_000, recording));

        h.identity_distance = Some(0.9);
        assert!(h.run_until(5_000, |c| c.phase() == SessionPhase::AwaitingAlignment));
        assert!(h.has_status(
            StatusKey::Identity,
            "Face does not match. The same person must stay in view"
        ));
        assert!(h.controller.partials().is_empty());
    }

    #[test]
    fn test_missing_descriptor_never_resets() {
        let mut h = Harness::new([3, 3, 4]);
        assert!(h.run_until(5_000, recording));

        h.identity_distance = None;
        assert!(h.run_until(5_000, |c| c.phase() == SessionPhase::Verifying));
    }

    #[test]
    fn test_camera_stop_halts_without_artifact() {
        let mut h = Harness::new([3, 3, 4]);
        assert!(h.run_until(5_000, |c| c.recording().elapsed() == 1));

        h.send(Event::CameraStopped);
        assert!(h.halted);
        assert_eq!(h.controller.phase(), SessionPhase::Halted);
        assert!(h.controller.segments().is_empty());
        assert!(h.controller.partials().is_empty());
        assert_eq!(h.controller.next_timer(), None);

        h.run_for(2_000);
        assert!(h.stored.is_empty());
    }

    #[test]
    fn test_plan_total_must_match() {
        let plan = SegmentPlan::from_targets([2, 3, 4]).unwrap();
        let result = SessionController::with_plan(SessionConfig::standard(), plan);
        assert!(matches!(result, Err(SessionError::Config(_))));
    }
}
