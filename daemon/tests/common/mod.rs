#![allow(dead_code)]

use async_trait::async_trait;
use capture_daemon::backend::{Backend, RemoteError};
use capture_daemon::daemon::{Daemon, DaemonSettings};
use capture_daemon::event::Event;
use capture_daemon::overlay::DisplaySurface;
use capture_daemon::video::Frame;
use image::{Rgb, RgbImage};
use shared::{
    Capture, CaptureError, ClientMessage, DaemonMessage, DaemonStatus, DetectionResult,
    DetectorOptions, HandDetection, Handedness, Landmark, Model, Prediction, SamplesSummary,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;
pub const UPLOAD_LATENCY: Duration = Duration::from_millis(50);

/// In-memory backend that behaves like the real one closely enough for the daemon.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
}

#[derive(Default)]
struct BackendState {
    uploads: Vec<Capture>,
    samples: BTreeMap<String, u64>,
    models: Vec<Model>,
    failing_attempts: HashSet<usize>,
    upload_attempts: usize,
    predict_calls: usize,
    in_flight: usize,
    max_in_flight: usize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the `attempt`-th upload (counting from zero) fail.
    pub fn fail_upload(&self, attempt: usize) {
        self.state.lock().unwrap().failing_attempts.insert(attempt);
    }

    pub fn uploads(&self) -> Vec<Capture> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn upload_attempts(&self) -> usize {
        self.state.lock().unwrap().upload_attempts
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }

    pub fn predict_calls(&self) -> usize {
        self.state.lock().unwrap().predict_calls
    }

    pub fn total_samples(&self) -> u64 {
        self.state.lock().unwrap().samples.values().sum()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn upload(&self, capture: &Capture) -> Result<(), RemoteError> {
        let attempt = {
            let mut state = self.state.lock().unwrap();
            let attempt = state.upload_attempts;
            state.upload_attempts += 1;
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            attempt
        };

        tokio::time::sleep(UPLOAD_LATENCY).await;

        let mut state = self.state.lock().unwrap();
        state.in_flight -= 1;
        if state.failing_attempts.contains(&attempt) {
            return Err(RemoteError::Api {
                status: 500,
                detail: "disk full".to_string(),
            });
        }
        state.uploads.push(capture.clone());
        *state.samples.entry(capture.label.clone()).or_default() += 1;
        Ok(())
    }

    async fn list_samples(&self) -> Result<SamplesSummary, RemoteError> {
        let state = self.state.lock().unwrap();
        Ok(SamplesSummary {
            total_samples: state.samples.values().sum(),
            samples_per_class: state.samples.clone(),
        })
    }

    async fn clear_samples(&self) -> Result<(), RemoteError> {
        self.state.lock().unwrap().samples.clear();
        Ok(())
    }

    async fn train(&self, name: &str) -> Result<Model, RemoteError> {
        let mut state = self.state.lock().unwrap();
        if state.samples.is_empty() {
            return Err(RemoteError::Api {
                status: 400,
                detail: "No samples available for training".to_string(),
            });
        }
        let model = Model {
            name: name.to_string(),
            accuracy: 0.9,
            n_samples: state.samples.values().sum(),
            classes: state.samples.keys().cloned().collect(),
        };
        state.models.push(model.clone());
        Ok(model)
    }

    async fn list_models(&self) -> Result<Vec<Model>, RemoteError> {
        Ok(self.state.lock().unwrap().models.clone())
    }

    async fn delete_model(&self, name: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        let before = state.models.len();
        state.models.retain(|model| model.name != name);
        if state.models.len() == before {
            return Err(RemoteError::Api {
                status: 404,
                detail: format!("Model {} not found", name),
            });
        }
        Ok(())
    }

    async fn predict(
        &self,
        image: Vec<u8>,
        _model: &str,
        _hands_detected: u32,
    ) -> Result<Prediction, RemoteError> {
        assert!(!image.is_empty());
        self.state.lock().unwrap().predict_calls += 1;
        Ok(Prediction {
            label: "A".to_string(),
            confidence: 0.9,
            alternatives: vec![("A".to_string(), 0.9), ("E".to_string(), 0.1)],
        })
    }
}

pub fn frame(sequence: u64) -> Frame {
    Frame::new(RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([200, 180, 160])), sequence)
}

pub fn hands(count: usize) -> DetectionResult {
    let hand = HandDetection {
        landmarks: vec![Landmark { x: 0.5, y: 0.5, z: 0.0 }; 21],
        handedness: Handedness::Right,
        confidence: 0.95,
    };
    DetectionResult {
        hands: vec![hand; count],
    }
}

/// A running daemon event loop wired to a [`FakeBackend`].
pub struct Harness {
    pub events: mpsc::Sender<Event>,
    pub backend: Arc<FakeBackend>,
    pub detector: watch::Receiver<DetectorOptions>,
    daemon: JoinHandle<anyhow::Result<()>>,
    frames: u64,
}

impl Harness {
    pub fn start(backend: Arc<FakeBackend>) -> Self {
        let surface = DisplaySurface::new(WIDTH, HEIGHT, None, 1);
        Self::with_surface(backend, surface)
    }

    pub fn with_surface(
        backend: Arc<FakeBackend>,
        surface: Result<DisplaySurface, CaptureError>,
    ) -> Self {
        let (events, inbox) = mpsc::channel(64);
        let (detector, options) = watch::channel(DetectorOptions::default());
        let daemon = Daemon::new(
            DaemonSettings::default(),
            surface,
            Arc::clone(&backend) as Arc<dyn Backend>,
            detector,
            events.clone(),
        );
        Self {
            events,
            backend,
            detector: options,
            daemon: tokio::spawn(daemon.run(inbox)),
            frames: 0,
        }
    }

    pub async fn show_hands(&mut self, count: usize) {
        self.frames += 1;
        self.events
            .send(Event::Frame {
                frame: frame(self.frames),
                result: hands(count),
            })
            .await
            .unwrap();
    }

    pub async fn command(&self, message: ClientMessage) -> DaemonMessage {
        let (reply, response) = oneshot::channel();
        self.events
            .send(Event::Command { message, reply })
            .await
            .unwrap();
        response.await.unwrap()
    }

    pub async fn status(&self) -> DaemonStatus {
        match self.command(ClientMessage::GetStatus).await {
            DaemonMessage::Status(status) => status,
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    pub async fn shutdown(self) {
        let reply = self.command(ClientMessage::Shutdown).await;
        assert!(matches!(reply, DaemonMessage::ShuttingDown));
        self.daemon.await.unwrap().unwrap();
    }
}
