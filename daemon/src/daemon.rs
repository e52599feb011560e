use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use shared::{
    CaptureError, ClientMessage, Config, DaemonMessage, DaemonStatus, DetectionState,
    DetectorOptions, Model, Prediction, RecordingInterval, SamplesSummary, Selection,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{mpsc, oneshot, watch};

use crate::backend::{Backend, RemoteError};
use crate::event::{EncodeJob, Event, PendingCapture, RemoteUpdate};
use crate::gate::DetectionGate;
use crate::notice::Notices;
use crate::overlay::DisplaySurface;
use crate::queue::UploadQueue;
use crate::scheduler::{self, CaptureScheduler, TickOutcome};
use crate::session::RecordingSession;
use crate::video::Frame;

/// The parts of [`Config`] the event loop needs.
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub interval: RecordingInterval,
    pub selection: Selection,
    pub jpeg_quality: u8,
    pub refresh_delay: Duration,
    pub notice_lifetime: Duration,
}

impl DaemonSettings {
    pub fn from_config(config: &Config) -> Self {
        let selection = Selection::new(&config.capture.category, &config.capture.label)
            .unwrap_or_else(|e| {
                warn!("Ignoring configured selection: {}", e);
                Selection::default()
            });
        Self {
            interval: config.capture.interval,
            selection,
            jpeg_quality: config.capture.jpeg_quality,
            refresh_delay: Duration::from_millis(config.capture.refresh_delay_ms),
            notice_lifetime: Duration::from_secs(config.ui.notice_seconds),
        }
    }
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Whether the event loop keeps going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

struct CaptureSubsystem {
    gate: DetectionGate,
    scheduler: CaptureScheduler,
}

/// Backend access for spawned tasks. Results that change daemon state are posted back as
/// [`Event::Remote`].
#[derive(Clone)]
struct Remote {
    backend: Arc<dyn Backend>,
    events: mpsc::Sender<Event>,
}

impl Remote {
    async fn post(&self, update: RemoteUpdate) {
        if self.events.send(Event::Remote(update)).await.is_err() {
            debug!("Event loop closed, dropping backend result");
        }
    }

    async fn refresh_samples(&self) -> Result<SamplesSummary, CaptureError> {
        match self.backend.list_samples().await {
            Ok(samples) => {
                self.post(RemoteUpdate::Samples(samples.clone())).await;
                Ok(samples)
            }
            Err(e) => Err(self.fail("Failed to load samples", e).await),
        }
    }

    async fn refresh_models(&self) -> Result<Vec<Model>, CaptureError> {
        match self.backend.list_models().await {
            Ok(models) => {
                self.post(RemoteUpdate::Models(models.clone())).await;
                Ok(models)
            }
            Err(e) => Err(self.fail("Failed to load models", e).await),
        }
    }

    async fn fail(&self, context: &str, err: RemoteError) -> CaptureError {
        let err = CaptureError::from(err);
        warn!("{}: {}", context, err);
        self.post(RemoteUpdate::failure(context, &err)).await;
        err
    }
}

/// Owns all capture state and handles every [`Event`] in arrival order.
///
/// Handling an event never waits: encoding and backend calls are spawned and come back as
/// further events, so state is only ever touched from this one task.
pub struct Daemon {
    capture: Result<CaptureSubsystem, CaptureError>,
    session: RecordingSession,
    selection: Selection,
    queue: UploadQueue,
    remote: Remote,
    notices: Notices,
    samples: Option<SamplesSummary>,
    models: Vec<Model>,
    last_prediction: Option<Prediction>,
    detector: watch::Sender<DetectorOptions>,
    jpeg_quality: u8,
    refresh_delay: Duration,
    start_time: Instant,
}

impl Daemon {
    /// `surface` is the display surface the capture subsystem draws on, or the reason it could
    /// not be set up. Without one, remote-only commands keep working.
    pub fn new(
        settings: DaemonSettings,
        surface: Result<DisplaySurface, CaptureError>,
        backend: Arc<dyn Backend>,
        detector: watch::Sender<DetectorOptions>,
        events: mpsc::Sender<Event>,
    ) -> Self {
        let capture = match surface {
            Ok(surface) => Ok(CaptureSubsystem {
                gate: DetectionGate::new(surface),
                scheduler: CaptureScheduler::new(settings.jpeg_quality, events.clone()),
            }),
            Err(e) => {
                error!("Capture disabled: {}", e);
                Err(e)
            }
        };

        Self {
            capture,
            session: RecordingSession::new(settings.interval, &settings.selection.label),
            selection: settings.selection,
            queue: UploadQueue::spawn(Arc::clone(&backend)),
            remote: Remote { backend, events },
            notices: Notices::new(settings.notice_lifetime),
            samples: None,
            models: Vec::new(),
            last_prediction: None,
            detector,
            jpeg_quality: settings.jpeg_quality,
            refresh_delay: settings.refresh_delay,
            start_time: Instant::now(),
        }
    }

    /// Runs until a `Shutdown` command arrives or `inbox` closes, then stops any active session
    /// and drains the upload queue.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<Event>) -> Result<()> {
        info!("Daemon ready");
        self.spawn_initial_refresh();

        while let Some(event) = inbox.recv().await {
            if self.handle_event(event) == Flow::Shutdown {
                break;
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Like [`run`](Self::run), on a task of its own, with `signal` handled as a `Shutdown`
    /// command.
    pub async fn run_until<F>(
        self,
        inbox: mpsc::Receiver<Event>,
        events: mpsc::Sender<Event>,
        signal: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut running = tokio::spawn(self.run(inbox));
        let joined = tokio::select! {
            joined = &mut running => joined,
            () = signal => {
                info!("Shutdown requested");
                let (reply, _) = oneshot::channel();
                let shutdown = Event::Command {
                    message: ClientMessage::Shutdown,
                    reply,
                };
                if events.send(shutdown).await.is_err() {
                    debug!("Event loop already closed");
                }
                running.await
            }
        };
        joined.context("Daemon task failed")?
    }

    pub async fn shutdown(mut self) {
        if let Ok(capture) = &mut self.capture {
            capture.scheduler.stop(&mut self.session);
        }
        self.queue.close().await;
        info!("Daemon stopped");
    }

    fn spawn_initial_refresh(&self) {
        let remote = self.remote.clone();
        tokio::spawn(async move {
            let _ = remote.refresh_samples().await;
            let _ = remote.refresh_models().await;
        });
    }

    pub fn handle_event(&mut self, event: Event) -> Flow {
        match event {
            Event::Frame { frame, result } => {
                if let Ok(capture) = &mut self.capture {
                    let recording = self
                        .session
                        .is_active()
                        .then(|| self.session.captures_count());
                    capture.gate.on_detection_result(frame, &result, recording);
                }
            }
            Event::Tick { generation } => {
                if let Ok(capture) = &mut self.capture {
                    let outcome = capture.scheduler.on_tick(
                        generation,
                        &self.session,
                        &capture.gate,
                        &self.selection.category,
                    );
                    if outcome != TickOutcome::Capturing {
                        debug!("Tick skipped: {:?}", outcome);
                    }
                }
            }
            Event::Encoded { job, result } => self.on_encoded(job, result),
            Event::Command { message, reply } => return self.handle_command(message, reply),
            Event::Remote(update) => self.apply_remote(update),
        }
        Flow::Continue
    }

    fn on_encoded(&mut self, job: EncodeJob, result: Result<Vec<u8>, String>) {
        match job {
            EncodeJob::Tick {
                generation,
                capture,
            } => {
                if let Ok(subsystem) = &mut self.capture {
                    subsystem.scheduler.on_encoded(
                        generation,
                        capture,
                        result,
                        &mut self.session,
                        &self.queue,
                    );
                }
            }
            EncodeJob::Sample { capture, reply } => {
                let image = match result {
                    Ok(image) => image,
                    Err(e) => return self.reply_error(reply, CaptureError::Encode(e)),
                };
                let label = capture.label.clone();
                let uploaded = self.queue.submit_with_ack(capture.into_capture(image));
                let remote = self.remote.clone();
                tokio::spawn(async move {
                    let outcome = uploaded.await.unwrap_or_else(|_| {
                        Err(CaptureError::Remote("upload was abandoned".to_string()))
                    });
                    let message = match outcome {
                        Ok(()) => {
                            info!("Sample for {} saved", label);
                            remote
                                .post(RemoteUpdate::success(format!("Sample saved: {}", label)))
                                .await;
                            let _ = remote.refresh_samples().await;
                            DaemonMessage::SampleCaptured { label }
                        }
                        Err(e) => {
                            remote
                                .post(RemoteUpdate::failure("Failed to save sample", &e))
                                .await;
                            DaemonMessage::Error(e)
                        }
                    };
                    let _ = reply.send(message);
                });
            }
            EncodeJob::Predict {
                model,
                hands_detected,
                reply,
            } => {
                let image = match result {
                    Ok(image) => image,
                    Err(e) => return self.reply_error(reply, CaptureError::Encode(e)),
                };
                let remote = self.remote.clone();
                tokio::spawn(async move {
                    let message = match remote.backend.predict(image, &model, hands_detected).await
                    {
                        Ok(prediction) => {
                            info!(
                                "Prediction with {}: {} ({:.1}%)",
                                model,
                                prediction.label,
                                prediction.confidence * 100.0
                            );
                            remote
                                .post(RemoteUpdate::Prediction(prediction.clone()))
                                .await;
                            DaemonMessage::Prediction(prediction)
                        }
                        Err(e) => DaemonMessage::Error(remote.fail("Prediction failed", e).await),
                    };
                    let _ = reply.send(message);
                });
            }
        }
    }

    fn apply_remote(&mut self, update: RemoteUpdate) {
        match update {
            RemoteUpdate::Samples(samples) => self.samples = Some(samples),
            RemoteUpdate::Models(models) => self.models = models,
            RemoteUpdate::Prediction(prediction) => self.last_prediction = Some(prediction),
            RemoteUpdate::Notice(notice) => self.notices.push(notice),
        }
    }

    fn reply_error(&mut self, reply: oneshot::Sender<DaemonMessage>, err: CaptureError) {
        warn!("Request failed: {}", err);
        self.notices.error(&err);
        let _ = reply.send(DaemonMessage::Error(err));
    }

    fn handle_command(
        &mut self,
        message: ClientMessage,
        reply: oneshot::Sender<DaemonMessage>,
    ) -> Flow {
        debug!("Handling client message: {:?}", message);

        match message {
            ClientMessage::StartRecording => {
                let started = match &mut self.capture {
                    Ok(capture) => capture.scheduler.start(
                        &mut self.session,
                        &capture.gate,
                        &self.selection.label,
                    ),
                    Err(e) => Err(e.clone()),
                };
                match started {
                    Ok(session_id) => {
                        let label = self.session.recording_label().to_string();
                        let interval = self.session.interval();
                        self.notices.success(format!(
                            "Recording {} every {}ms",
                            label,
                            interval.as_millis()
                        ));
                        let _ = reply.send(DaemonMessage::RecordingStarted {
                            session_id,
                            label,
                            interval,
                        });
                    }
                    Err(e) => self.reply_error(reply, e),
                }
            }
            ClientMessage::StopRecording => {
                let stopped = match &mut self.capture {
                    Ok(capture) => capture.scheduler.stop(&mut self.session),
                    Err(_) => None,
                };
                match stopped {
                    Some(captures) => {
                        self.notices
                            .success(format!("Recording stopped: {} captures", captures));
                        self.spawn_delayed_refresh();
                        let _ = reply.send(DaemonMessage::RecordingStopped { captures });
                    }
                    None => self.reply_error(
                        reply,
                        CaptureError::Validation("no recording in progress".to_string()),
                    ),
                }
            }
            ClientMessage::SetInterval(millis) => match RecordingInterval::try_from(millis) {
                Ok(interval) => {
                    let applied = self.session.set_interval(interval);
                    if applied {
                        info!("Capture interval set to {}ms", interval.as_millis());
                    } else {
                        info!("Ignoring interval change while recording");
                    }
                    let _ = reply.send(DaemonMessage::Interval {
                        interval: self.session.interval(),
                        applied,
                    });
                }
                Err(e) => self.reply_error(reply, CaptureError::Validation(e)),
            },
            ClientMessage::SelectCategory(key) => match self.selection.select_category(&key) {
                Ok(()) => {
                    let _ = reply.send(DaemonMessage::Selection(self.selection.clone()));
                }
                Err(e) => self.reply_error(reply, e),
            },
            ClientMessage::SelectLabel(label) => match self.selection.select_label(&label) {
                Ok(()) => {
                    let _ = reply.send(DaemonMessage::Selection(self.selection.clone()));
                }
                Err(e) => self.reply_error(reply, e),
            },
            ClientMessage::CaptureSample => match self.snapshot_target() {
                Ok((frame, hands_detected)) => {
                    let capture = PendingCapture {
                        label: self.selection.label.clone(),
                        category: self.selection.category.clone(),
                        hands_detected,
                        captured_at: SystemTime::now(),
                    };
                    scheduler::spawn_encode(
                        frame,
                        self.jpeg_quality,
                        EncodeJob::Sample { capture, reply },
                        self.remote.events.clone(),
                    );
                }
                Err(e) => self.reply_error(reply, e),
            },
            ClientMessage::Predict { model } => {
                if model.trim().is_empty() {
                    self.reply_error(
                        reply,
                        CaptureError::Validation("no model selected".to_string()),
                    );
                    return Flow::Continue;
                }
                match self.snapshot_target() {
                    Ok((frame, hands_detected)) => scheduler::spawn_encode(
                        frame,
                        self.jpeg_quality,
                        EncodeJob::Predict {
                            model,
                            hands_detected,
                            reply,
                        },
                        self.remote.events.clone(),
                    ),
                    Err(e) => self.reply_error(reply, e),
                }
            }
            ClientMessage::ListSamples => {
                let remote = self.remote.clone();
                tokio::spawn(async move {
                    let message = match remote.refresh_samples().await {
                        Ok(samples) => DaemonMessage::Samples(samples),
                        Err(e) => DaemonMessage::Error(e),
                    };
                    let _ = reply.send(message);
                });
            }
            ClientMessage::ClearSamples => {
                let remote = self.remote.clone();
                tokio::spawn(async move {
                    let message = match remote.backend.clear_samples().await {
                        Ok(()) => {
                            info!("All samples deleted");
                            remote
                                .post(RemoteUpdate::success("All samples deleted"))
                                .await;
                            let _ = remote.refresh_samples().await;
                            DaemonMessage::SamplesCleared
                        }
                        Err(e) => {
                            DaemonMessage::Error(remote.fail("Failed to clear samples", e).await)
                        }
                    };
                    let _ = reply.send(message);
                });
            }
            ClientMessage::Train { name } => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    self.reply_error(
                        reply,
                        CaptureError::Validation("model name is required".to_string()),
                    );
                    return Flow::Continue;
                }
                let remote = self.remote.clone();
                tokio::spawn(async move {
                    info!("Training model {}", name);
                    let message = match remote.backend.train(&name).await {
                        Ok(model) => {
                            remote
                                .post(RemoteUpdate::success(format!(
                                    "Model {} trained ({:.1}% accuracy)",
                                    model.name,
                                    model.accuracy * 100.0
                                )))
                                .await;
                            let _ = remote.refresh_models().await;
                            DaemonMessage::ModelTrained(model)
                        }
                        Err(e) => DaemonMessage::Error(remote.fail("Training failed", e).await),
                    };
                    let _ = reply.send(message);
                });
            }
            ClientMessage::ListModels => {
                let remote = self.remote.clone();
                tokio::spawn(async move {
                    let message = match remote.refresh_models().await {
                        Ok(models) => DaemonMessage::Models(models),
                        Err(e) => DaemonMessage::Error(e),
                    };
                    let _ = reply.send(message);
                });
            }
            ClientMessage::DeleteModel { name } => {
                let remote = self.remote.clone();
                tokio::spawn(async move {
                    let message = match remote.backend.delete_model(&name).await {
                        Ok(()) => {
                            info!("Model {} deleted", name);
                            remote
                                .post(RemoteUpdate::success(format!("Model {} deleted", name)))
                                .await;
                            let _ = remote.refresh_models().await;
                            DaemonMessage::ModelDeleted(name)
                        }
                        Err(e) => {
                            DaemonMessage::Error(remote.fail("Failed to delete model", e).await)
                        }
                    };
                    let _ = reply.send(message);
                });
            }
            ClientMessage::ApplyPreset(preset) => {
                let options = preset.options();
                info!("Applying {:?} detector preset", preset);
                self.detector.send_replace(options);
                self.notices
                    .success(format!("Detector preset {:?} applied", preset));
                let _ = reply.send(DaemonMessage::DetectorConfigured(options));
            }
            ClientMessage::GetStatus => {
                let _ = reply.send(DaemonMessage::Status(self.status()));
            }
            ClientMessage::Shutdown => {
                info!("Received shutdown command");
                let _ = reply.send(DaemonMessage::ShuttingDown);
                return Flow::Shutdown;
            }
        }
        Flow::Continue
    }

    /// The frame to snapshot for a one-off request, with the hand count at that moment.
    fn snapshot_target(&self) -> Result<(Frame, u32), CaptureError> {
        let capture = self.capture.as_ref().map_err(|e| e.clone())?;
        match capture.gate.current_frame() {
            Some(frame) if capture.gate.is_gate_open() => {
                Ok((frame.clone(), capture.gate.state().hands_detected))
            }
            _ => Err(CaptureError::no_hand()),
        }
    }

    /// The backend needs a moment to index the last uploads before the summary reflects them.
    fn spawn_delayed_refresh(&self) {
        let remote = self.remote.clone();
        let delay = self.refresh_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = remote.refresh_samples().await;
        });
    }

    pub fn status(&mut self) -> DaemonStatus {
        let detection = match &self.capture {
            Ok(capture) => capture.gate.state().clone(),
            Err(_) => DetectionState::default(),
        };
        DaemonStatus {
            capture_enabled: self.capture.is_ok(),
            detection,
            session: self.session.snapshot(),
            selection: self.selection.clone(),
            samples: self.samples.clone(),
            models: self.models.clone(),
            last_prediction: self.last_prediction.clone(),
            pending_uploads: self.queue.pending(),
            detector: *self.detector.borrow(),
            notices: self.notices.active(),
            uptime: self.start_time.elapsed(),
        }
    }
}
