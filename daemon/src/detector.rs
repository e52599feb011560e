//! Hand landmark detection adapters.
//!
//! The detection algorithm itself lives outside this process. [`SubprocessDetector`] talks to a
//! helper program (typically a MediaPipe Hands wrapper) over its stdin/stdout:
//!
//! * The helper prints `READY` once it is able to accept frames.
//! * Each frame is sent as three little-endian `u32`s (width, height, channels = 3) followed by
//!   the raw RGB bytes. The helper answers with one JSON line:
//!   `{"hands": [{"handedness": "Left", "score": 0.97, "landmarks": [{"x":..,"y":..,"z":..}]}]}`
//!   and an optional `"error"` string.
//! * Options are sent as a header with `channels = 0`, followed by the length of a JSON document
//!   and the document itself. The helper does not answer options headers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use shared::{DetectionResult, DetectorOptions, HandDetection, Handedness, Landmark};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::video::Frame;

/// Number of landmarks in the MediaPipe hand topology.
pub const HAND_LANDMARKS: usize = 21;

/// Normalized landmark coordinates may overshoot the frame a little; anything beyond this is
/// garbage from the helper.
const LANDMARK_RANGE: std::ops::RangeInclusive<f32> = -1.0..=2.0;

/// Produces one [`DetectionResult`] per frame.
#[async_trait]
pub trait LandmarkDetector: Send {
    async fn detect(&mut self, frame: &Frame) -> Result<DetectionResult>;

    /// Applies new options. They take effect from the next call to [`detect`](Self::detect).
    async fn configure(&mut self, options: DetectorOptions) -> Result<()>;
}

#[derive(Deserialize, Debug)]
struct LandmarkJson {
    x: f32,
    y: f32,
    #[serde(default)]
    z: f32,
}

#[derive(Deserialize, Debug)]
struct HandJson {
    handedness: String,
    score: f32,
    landmarks: Vec<LandmarkJson>,
}

#[derive(Deserialize, Debug)]
struct DetectionJson {
    #[serde(default)]
    hands: Vec<HandJson>,
    #[serde(default)]
    error: Option<String>,
}

/// Parses one line of helper output, dropping hands the options exclude.
fn parse_detection(line: &str, options: &DetectorOptions) -> Result<DetectionResult> {
    let parsed: DetectionJson = serde_json::from_str(line.trim())
        .with_context(|| format!("Failed to parse detector output: {}", line.trim()))?;

    if let Some(error) = parsed.error {
        warn!("Detector reported an error: {}", error);
        return Ok(DetectionResult::empty());
    }

    let mut hands = Vec::with_capacity(parsed.hands.len());
    for hand in parsed.hands {
        if hand.score < options.min_detection_confidence {
            continue;
        }
        if hand.landmarks.len() != HAND_LANDMARKS {
            warn!("Expected {} landmarks, got {}", HAND_LANDMARKS, hand.landmarks.len());
            continue;
        }
        let in_range = hand
            .landmarks
            .iter()
            .all(|lm| LANDMARK_RANGE.contains(&lm.x) && LANDMARK_RANGE.contains(&lm.y));
        if !in_range {
            warn!("Dropping hand with landmarks outside the frame");
            continue;
        }
        let handedness = match hand.handedness.to_ascii_lowercase().as_str() {
            "left" => Handedness::Left,
            "right" => Handedness::Right,
            other => {
                warn!("Unknown handedness '{}'", other);
                continue;
            }
        };
        hands.push(HandDetection {
            landmarks: hand
                .landmarks
                .into_iter()
                .map(|lm| Landmark { x: lm.x, y: lm.y, z: lm.z })
                .collect(),
            handedness,
            confidence: hand.score.clamp(0.0, 1.0),
        });
        if hands.len() as u32 >= options.max_hands {
            break;
        }
    }

    Ok(DetectionResult { hands })
}

/// Runs an external landmark detector as a child process.
pub struct SubprocessDetector {
    // Held so the child is killed when the detector is dropped.
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    options: DetectorOptions,
}

impl SubprocessDetector {
    pub async fn spawn(program: &Path, args: &[String], options: DetectorOptions) -> Result<Self> {
        info!("Starting hand detector {:?} {:?}", program, args);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start detector {:?}", program))?;

        let stdin = child.stdin.take().context("Failed to get detector stdin")?;
        let stdout = child.stdout.take().context("Failed to get detector stdout")?;
        let mut stdout = BufReader::new(stdout);

        let mut ready_line = String::new();
        stdout.read_line(&mut ready_line).await?;
        if ready_line.trim() != "READY" {
            anyhow::bail!("Detector did not signal ready, got: {:?}", ready_line.trim());
        }
        info!("Hand detector ready");

        let mut detector = Self {
            _child: child,
            stdin,
            stdout,
            options,
        };
        detector.send_options().await?;
        Ok(detector)
    }

    async fn send_options(&mut self) -> Result<()> {
        let payload = serde_json::to_vec(&self.options)?;
        let mut header = Vec::with_capacity(16);
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&(payload.len() as u32).to_le_bytes());

        self.stdin.write_all(&header).await?;
        self.stdin.write_all(&payload).await?;
        self.stdin.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl LandmarkDetector for SubprocessDetector {
    async fn detect(&mut self, frame: &Frame) -> Result<DetectionResult> {
        let mut header = [0u8; 12];
        header[0..4].copy_from_slice(&frame.width().to_le_bytes());
        header[4..8].copy_from_slice(&frame.height().to_le_bytes());
        header[8..12].copy_from_slice(&3u32.to_le_bytes());

        self.stdin.write_all(&header).await?;
        self.stdin.write_all(frame.image.as_raw()).await?;
        self.stdin.flush().await?;

        let mut response = String::new();
        if self.stdout.read_line(&mut response).await? == 0 {
            anyhow::bail!("Detector closed its output");
        }

        let result = parse_detection(&response, &self.options)?;
        debug!("Frame {}: {} hand(s)", frame.sequence, result.hands.len());
        Ok(result)
    }

    async fn configure(&mut self, options: DetectorOptions) -> Result<()> {
        info!("Applying detector options {:?}", options);
        self.options = options;
        self.send_options().await
    }
}
