//! Interval-paced captures for an active recording session.

use log::{debug, warn};
use shared::CaptureError;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::encode;
use crate::event::{EncodeJob, Event, PendingCapture};
use crate::gate::DetectionGate;
use crate::queue::UploadQueue;
use crate::session::RecordingSession;
use crate::video::Frame;

/// What happened to a timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A snapshot is being encoded.
    Capturing,
    /// No hand in view; the tick is skipped.
    GateClosed,
    /// The previous tick's snapshot is still encoding; the tick is skipped.
    EncodeInProgress,
    /// The tick belongs to a session that is no longer active.
    Stale,
}

/// The recurring timer task. Dropping it disarms the timer.
struct Ticker {
    handle: JoinHandle<()>,
}

impl Ticker {
    fn arm(period: Duration, generation: u64, events: mpsc::Sender<Event>) -> Self {
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                timer.tick().await;
                if events.send(Event::Tick { generation }).await.is_err() {
                    break;
                }
            }
        });
        Self { handle }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct CaptureScheduler {
    ticker: Option<Ticker>,
    encoding: bool,
    jpeg_quality: u8,
    events: mpsc::Sender<Event>,
}

impl CaptureScheduler {
    pub fn new(jpeg_quality: u8, events: mpsc::Sender<Event>) -> Self {
        Self {
            ticker: None,
            encoding: false,
            jpeg_quality,
            events,
        }
    }

    /// Starts `session` under `label` and arms the timer. Fails without touching anything if no
    /// hand is in view.
    pub fn start(
        &mut self,
        session: &mut RecordingSession,
        gate: &DetectionGate,
        label: &str,
    ) -> Result<Uuid, CaptureError> {
        let id = session.start(label, gate.is_gate_open())?;
        self.ticker = Some(Ticker::arm(
            session.interval().as_duration(),
            session.generation(),
            self.events.clone(),
        ));
        Ok(id)
    }

    /// Disarms the timer and stops `session`. A snapshot already encoding may still be
    /// submitted when it finishes.
    pub fn stop(&mut self, session: &mut RecordingSession) -> Option<u64> {
        self.ticker = None;
        session.stop()
    }

    pub fn is_armed(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn is_encoding(&self) -> bool {
        self.encoding
    }

    pub fn on_tick(
        &mut self,
        generation: u64,
        session: &RecordingSession,
        gate: &DetectionGate,
        category: &str,
    ) -> TickOutcome {
        if !session.is_active() || generation != session.generation() {
            return TickOutcome::Stale;
        }
        let frame = match gate.current_frame() {
            Some(frame) if gate.is_gate_open() => frame.clone(),
            _ => return TickOutcome::GateClosed,
        };
        if self.encoding {
            return TickOutcome::EncodeInProgress;
        }

        self.encoding = true;
        let capture = PendingCapture {
            label: session.recording_label().to_string(),
            category: category.to_string(),
            hands_detected: gate.state().hands_detected,
            captured_at: SystemTime::now(),
        };
        spawn_encode(
            frame,
            self.jpeg_quality,
            EncodeJob::Tick {
                generation,
                capture,
            },
            self.events.clone(),
        );
        TickOutcome::Capturing
    }

    /// Finishes a tick's capture: counts it and hands it to the upload queue.
    pub fn on_encoded(
        &mut self,
        generation: u64,
        capture: PendingCapture,
        image: Result<Vec<u8>, String>,
        session: &mut RecordingSession,
        queue: &UploadQueue,
    ) {
        self.encoding = false;
        let image = match image {
            Ok(image) => image,
            Err(e) => {
                warn!("Failed to encode capture for {}: {}", capture.label, e);
                return;
            }
        };
        if session.record_capture(generation) {
            debug!(
                "Capture {} for {} queued",
                session.captures_count(),
                capture.label
            );
        } else {
            debug!("Late capture for {} queued", capture.label);
        }
        queue.submit(capture.into_capture(image));
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }
}

/// Encodes `frame` off the event task and reports back with an [`Event::Encoded`].
pub fn spawn_encode(frame: Frame, quality: u8, job: EncodeJob, events: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        let result = encode::snapshot(&frame, quality)
            .await
            .map_err(|e| e.to_string());
        let _ = events.send(Event::Encoded { job, result }).await;
    });
}
