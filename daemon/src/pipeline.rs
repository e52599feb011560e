//! Frames from the video source through the landmark detector, delivered to the event loop in
//! source order.

use anyhow::Result;
use log::{debug, error, info, warn};
use shared::{CaptureError, Config, DetectionResult, DetectorOptions};
use tokio::sync::{mpsc, watch};

use crate::detector::{LandmarkDetector, SubprocessDetector};
use crate::event::Event;
use crate::overlay::DisplaySurface;
use crate::video::{DirectorySource, VideoSource};

/// Consecutive detector failures after which the pipeline gives up.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 30;

/// Sets up the video source, detector and display surface from `config` and starts feeding
/// frames into `events`. Any failure leaves the capture subsystem disabled.
pub async fn start(
    config: &Config,
    options: watch::Receiver<DetectorOptions>,
    events: mpsc::Sender<Event>,
) -> Result<DisplaySurface, CaptureError> {
    let surface = DisplaySurface::new(
        config.capture.width,
        config.capture.height,
        config.ui.preview_path.clone(),
        config.ui.preview_every,
    )?;

    let source = DirectorySource::open(
        &config.video.frames_dir,
        config.video.fps,
        config.capture.width,
        config.capture.height,
    )
    .await
    .map_err(|e| CaptureError::Initialization(format!("{:#}", e)))?;

    let initial = *options.borrow();
    let detector = SubprocessDetector::spawn(&config.detector.command, &config.detector.args, initial)
        .await
        .map_err(|e| CaptureError::Initialization(format!("{:#}", e)))?;

    tokio::spawn(async move {
        if let Err(e) = run_frames(source, detector, options, events).await {
            error!("Capture pipeline stopped: {:#}", e);
        }
    });
    Ok(surface)
}

/// Pulls frames until the source runs dry or the event loop goes away.
///
/// Option changes are applied to the detector before the next frame. A failed detection is
/// delivered as an empty result so the gate closes instead of going stale.
pub async fn run_frames<S, D>(
    mut source: S,
    mut detector: D,
    mut options: watch::Receiver<DetectorOptions>,
    events: mpsc::Sender<Event>,
) -> Result<()>
where
    S: VideoSource,
    D: LandmarkDetector,
{
    let mut failures = 0u32;
    loop {
        if options.has_changed().unwrap_or(false) {
            let latest = *options.borrow_and_update();
            if let Err(e) = detector.configure(latest).await {
                warn!("Failed to apply detector options: {:#}", e);
            }
        }

        let Some(frame) = source.next_frame().await? else {
            info!("Video source ended");
            return Ok(());
        };

        let result = match detector.detect(&frame).await {
            Ok(result) => {
                failures = 0;
                result
            }
            Err(e) => {
                failures += 1;
                warn!("Detection failed on frame {}: {:#}", frame.sequence, e);
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    anyhow::bail!("detector failed {} times in a row", failures);
                }
                DetectionResult::empty()
            }
        };

        if events.send(Event::Frame { frame, result }).await.is_err() {
            debug!("Event loop closed, stopping capture pipeline");
            return Ok(());
        }
    }
}
