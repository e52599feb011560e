mod common;

use anyhow::Result;
use async_trait::async_trait;
use capture_daemon::detector::LandmarkDetector;
use capture_daemon::event::Event;
use capture_daemon::pipeline::{run_frames, MAX_CONSECUTIVE_FAILURES};
use capture_daemon::video::{Frame, VideoSource};
use shared::{DetectionResult, DetectorOptions, DetectorPreset};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

/// Yields `count` frames, then ends.
struct CountingSource {
    remaining: u64,
    sequence: u64,
}

impl CountingSource {
    fn new(count: u64) -> Self {
        Self {
            remaining: count,
            sequence: 0,
        }
    }
}

#[async_trait]
impl VideoSource for CountingSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        self.sequence += 1;
        Ok(Some(common::frame(self.sequence)))
    }
}

/// Answers with scripted results; `None` entries fail. Runs out into empty results.
struct ScriptedDetector {
    script: VecDeque<Option<usize>>,
    configured: Arc<Mutex<Vec<(u64, DetectorOptions)>>>,
    frames_seen: u64,
}

impl ScriptedDetector {
    fn new(script: Vec<Option<usize>>) -> Self {
        Self {
            script: script.into(),
            configured: Arc::default(),
            frames_seen: 0,
        }
    }
}

#[async_trait]
impl LandmarkDetector for ScriptedDetector {
    async fn detect(&mut self, _frame: &Frame) -> Result<DetectionResult> {
        self.frames_seen += 1;
        match self.script.pop_front() {
            Some(Some(hands)) => Ok(common::hands(hands)),
            Some(None) => anyhow::bail!("inference crashed"),
            None => Ok(DetectionResult::empty()),
        }
    }

    async fn configure(&mut self, options: DetectorOptions) -> Result<()> {
        self.configured.lock().unwrap().push((self.frames_seen, options));
        Ok(())
    }
}

fn drain(inbox: &mut mpsc::Receiver<Event>) -> Vec<(u64, u32)> {
    let mut frames = Vec::new();
    while let Ok(event) = inbox.try_recv() {
        if let Event::Frame { frame, result } = event {
            frames.push((frame.sequence, result.hands_detected()));
        }
    }
    frames
}

#[tokio::test]
async fn results_arrive_in_frame_order_and_failures_close_the_gate() {
    let (events, mut inbox) = mpsc::channel(16);
    let (_options, options_rx) = watch::channel(DetectorOptions::default());
    let detector = ScriptedDetector::new(vec![Some(1), None, Some(2), Some(0)]);

    run_frames(CountingSource::new(4), detector, options_rx, events)
        .await
        .unwrap();

    assert_eq!(drain(&mut inbox), vec![(1, 1), (2, 0), (3, 2), (4, 0)]);
}

#[tokio::test]
async fn option_changes_apply_before_the_next_frame() {
    let (events, mut inbox) = mpsc::channel(16);
    let (options, options_rx) = watch::channel(DetectorOptions::default());
    let detector = ScriptedDetector::new(vec![Some(1); 3]);
    let configured = Arc::clone(&detector.configured);

    options.send_replace(DetectorPreset::Standard.options());
    run_frames(CountingSource::new(3), detector, options_rx, events)
        .await
        .unwrap();

    let configured = configured.lock().unwrap();
    assert_eq!(configured.len(), 1);
    assert_eq!(configured[0], (0, DetectorPreset::Standard.options()));
    assert_eq!(drain(&mut inbox).len(), 3);
}

#[tokio::test]
async fn persistent_detector_failure_stops_the_pipeline() {
    let (events, mut inbox) = mpsc::channel(64);
    let (_options, options_rx) = watch::channel(DetectorOptions::default());
    let script = vec![None; MAX_CONSECUTIVE_FAILURES as usize];
    let detector = ScriptedDetector::new(script);

    let result = run_frames(CountingSource::new(100), detector, options_rx, events).await;

    assert!(result.is_err());
    assert_eq!(drain(&mut inbox).len(), MAX_CONSECUTIVE_FAILURES as usize - 1);
}

#[tokio::test]
async fn pipeline_ends_when_the_event_loop_is_gone() {
    let (events, inbox) = mpsc::channel(4);
    drop(inbox);
    let (_options, options_rx) = watch::channel(DetectorOptions::default());

    let result = run_frames(
        CountingSource::new(10),
        ScriptedDetector::new(Vec::new()),
        options_rx,
        events,
    )
    .await;
    assert!(result.is_ok());
}
