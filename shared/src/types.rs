use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// A single hand landmark, normalized to the frame (`x`, `y` in `0.0..=1.0`, `z` relative to the
/// wrist).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handedness::Left => f.write_str("Left"),
            Handedness::Right => f.write_str("Right"),
        }
    }
}

/// One detected hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandDetection {
    pub landmarks: Vec<Landmark>,
    pub handedness: Handedness,
    pub confidence: f32,
}

/// Everything the landmark detector reported for a single source frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub hands: Vec<HandDetection>,
}

impl DetectionResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn hands_detected(&self) -> u32 {
        self.hands.len() as u32
    }
}

/// Snapshot of the most recent detection, overwritten on every processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionState {
    pub hands_detected: u32,
    pub status: String,
}

impl Default for DetectionState {
    fn default() -> Self {
        Self {
            hands_detected: 0,
            status: "Waiting for detection...".to_string(),
        }
    }
}

impl DetectionState {
    pub fn from_result(result: &DetectionResult) -> Self {
        let hands_detected = result.hands_detected();
        let status = match hands_detected {
            0 => "No hands detected".to_string(),
            1 => "1 hand detected".to_string(),
            n => format!("{} hands detected", n),
        };
        Self {
            hands_detected,
            status,
        }
    }
}

/// The capture intervals an operator may pick for a recording session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum RecordingInterval {
    HalfSecond,
    #[default]
    OneSecond,
    TwoSeconds,
    ThreeSeconds,
}

impl RecordingInterval {
    pub const ALL: [RecordingInterval; 4] = [
        RecordingInterval::HalfSecond,
        RecordingInterval::OneSecond,
        RecordingInterval::TwoSeconds,
        RecordingInterval::ThreeSeconds,
    ];

    pub fn as_millis(self) -> u64 {
        match self {
            RecordingInterval::HalfSecond => 500,
            RecordingInterval::OneSecond => 1000,
            RecordingInterval::TwoSeconds => 2000,
            RecordingInterval::ThreeSeconds => 3000,
        }
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.as_millis())
    }
}

impl TryFrom<u64> for RecordingInterval {
    type Error = String;

    fn try_from(millis: u64) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|interval| interval.as_millis() == millis)
            .ok_or_else(|| format!("unsupported interval {}ms (expected 500, 1000, 2000 or 3000)", millis))
    }
}

impl From<RecordingInterval> for u64 {
    fn from(interval: RecordingInterval) -> Self {
        interval.as_millis()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Idle,
    Active,
}

/// Read-only view of the recording session, as reported to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: Option<Uuid>,
    pub status: SessionStatus,
    pub interval: RecordingInterval,
    pub recording_label: String,
    pub captures_count: u64,
    pub started_at: Option<SystemTime>,
}

/// One labeled JPEG snapshot on its way to the backend.
#[derive(Debug, Clone)]
pub struct Capture {
    pub image: Vec<u8>,
    pub label: String,
    pub category: String,
    pub hands_detected_at_capture: u32,
    pub captured_at: SystemTime,
}

impl Capture {
    /// File name used for the multipart upload.
    pub fn file_name(&self) -> String {
        let millis = self
            .captured_at
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        format!("frame_{}.jpg", millis)
    }
}

/// The currently selected category and symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub category: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    #[serde(default)]
    pub accuracy: f32,
    #[serde(default)]
    pub n_samples: u64,
    #[serde(default)]
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
    /// Every class with its probability, highest first.
    pub alternatives: Vec<(String, f32)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplesSummary {
    pub total_samples: u64,
    #[serde(default)]
    pub samples_per_class: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A transient message for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

/// Detector tuning, applied before the next processed frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorOptions {
    pub max_hands: u32,
    pub model_complexity: u32,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            max_hands: 2,
            model_complexity: 1,
            min_detection_confidence: 0.7,
            min_tracking_confidence: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorPreset {
    /// Two hands, relaxed thresholds.
    Standard,
    /// One hand, strict thresholds.
    Precise,
}

impl DetectorPreset {
    pub fn options(self) -> DetectorOptions {
        match self {
            DetectorPreset::Standard => DetectorOptions {
                max_hands: 2,
                model_complexity: 1,
                min_detection_confidence: 0.5,
                min_tracking_confidence: 0.5,
            },
            DetectorPreset::Precise => DetectorOptions {
                max_hands: 1,
                model_complexity: 1,
                min_detection_confidence: 0.7,
                min_tracking_confidence: 0.7,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// `false` when the capture subsystem failed to initialize.
    pub capture_enabled: bool,
    pub detection: DetectionState,
    pub session: SessionSnapshot,
    pub selection: Selection,
    pub samples: Option<SamplesSummary>,
    pub models: Vec<Model>,
    pub last_prediction: Option<Prediction>,
    pub pending_uploads: usize,
    pub detector: DetectorOptions,
    pub notices: Vec<Notice>,
    pub uptime: Duration,
}
