//! Liveness Capture Simulator - Main Entry Point
//!
//! Runs one capture session against the synthetic camera and sweeping
//! locator, then prints the artifact manifest as JSON.
//!
//! Usage: `liveness-sim [config.toml]`

use std::path::PathBuf;

use anyhow::Context;
use camera_capture::FrameSource;
use capture_session::{
    init_logging, CaptureEngine, SessionConfig, SessionOutcome, SweepingLocator, SyntheticCamera,
};
use segment_recorder::MemoryRecorder;
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(Level::INFO)?;

    info!("=== Liveness Capture Simulator v{} ===", env!("CARGO_PKG_VERSION"));

    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = SessionConfig::load(path.as_deref()).context("loading session config")?;
    info!(
        "Session: {}s across 3 segments, refresh {} Hz",
        config.total_seconds, config.detection.refresh_hz
    );

    let camera = SyntheticCamera::new(640, 480, 30.0);
    info!("Camera: {:?}", camera.capabilities());
    let locator = SweepingLocator::new(config.guide.clone());

    let engine = CaptureEngine::new(
        config,
        camera,
        locator,
        Box::new(MemoryRecorder::default()),
        Box::new(MemoryRecorder::default()),
    )?;

    match engine.run().await? {
        SessionOutcome::Completed(bundle) => {
            info!(
                "Session {} complete: {} segments, {} partials, {} clips",
                bundle.session_id,
                bundle.segments.len(),
                bundle.partials.len(),
                bundle.clips.len()
            );
            println!("{}", bundle.manifest_json()?);
        }
        SessionOutcome::Halted => warn!("Camera stopped before the session completed"),
    }

    Ok(())
}
