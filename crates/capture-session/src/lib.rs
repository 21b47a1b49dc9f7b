//! Capture Session
//!
//! Orchestrates a liveness capture session:
//! - `SessionController`: single-owner state machine, `(state, event) -> effects`
//! - Logical timers, recorder slot arbitration and a keyed status board
//! - `CaptureEngine`: async driver wiring frame source, locator and recorders
//! - Simulation doubles for running a session without hardware

pub mod config;
pub mod controller;
pub mod engine;
pub mod event;
pub mod scheduler;
pub mod sim;
pub mod slots;
pub mod status;
pub mod timers;

pub use config::{LoopConfig, SessionConfig, TimingConfig};
pub use controller::{SessionController, SessionPhase};
pub use engine::{CaptureEngine, SessionOutcome};
pub use event::{Effect, Event, Observation, RecorderCommand, StatusKey, StatusUpdate};
pub use scheduler::{DetectionLoop, LoopAction, TickPlan};
pub use sim::{SweepingLocator, SyntheticCamera};
pub use slots::{RecorderSlots, SlotStatus};
pub use status::StatusBoard;
pub use timers::{TimerKind, TimerQueue};

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Session error types
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Camera error: {0}")]
    Camera(#[from] camera_capture::CameraError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] ::config::ConfigError),

    #[error("Segment plan error: {0}")]
    Plan(#[from] segment_recorder::PlanError),

    #[error("Quality analyzer error: {0}")]
    Quality(#[from] frame_quality::QualityError),

    #[error("Liveness error: {0}")]
    Liveness(#[from] liveness::LivenessError),
}

/// Install the global fmt subscriber
pub fn init_logging(level: Level) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}
