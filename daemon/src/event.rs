use shared::{
    Capture, CaptureError, ClientMessage, DaemonMessage, DetectionResult, Model, Notice,
    Prediction, SamplesSummary,
};
use std::time::SystemTime;
use tokio::sync::oneshot;

use crate::video::Frame;

/// Everything the daemon reacts to. Events are handled one at a time, in arrival order, by the
/// task that owns all capture state.
#[derive(Debug)]
pub enum Event {
    /// A source frame and the detector's result for it.
    Frame {
        frame: Frame,
        result: DetectionResult,
    },
    /// The recording timer fired for the session of `generation`.
    Tick { generation: u64 },
    /// A frame snapshot finished encoding.
    Encoded {
        job: EncodeJob,
        result: Result<Vec<u8>, String>,
    },
    /// An operator request, answered through `reply`.
    Command {
        message: ClientMessage,
        reply: oneshot::Sender<DaemonMessage>,
    },
    /// A backend call finished and has state to hand back.
    Remote(RemoteUpdate),
}

/// What an encoded snapshot is for.
#[derive(Debug)]
pub enum EncodeJob {
    Tick {
        generation: u64,
        capture: PendingCapture,
    },
    Sample {
        capture: PendingCapture,
        reply: oneshot::Sender<DaemonMessage>,
    },
    Predict {
        model: String,
        hands_detected: u32,
        reply: oneshot::Sender<DaemonMessage>,
    },
}

/// The metadata of a capture, fixed when the snapshot is taken.
#[derive(Debug, Clone)]
pub struct PendingCapture {
    pub label: String,
    pub category: String,
    pub hands_detected: u32,
    pub captured_at: SystemTime,
}

impl PendingCapture {
    pub fn into_capture(self, image: Vec<u8>) -> Capture {
        Capture {
            image,
            label: self.label,
            category: self.category,
            hands_detected_at_capture: self.hands_detected,
            captured_at: self.captured_at,
        }
    }
}

#[derive(Debug)]
pub enum RemoteUpdate {
    Samples(SamplesSummary),
    Models(Vec<Model>),
    Prediction(Prediction),
    Notice(Notice),
}

impl RemoteUpdate {
    pub fn success(text: impl Into<String>) -> Self {
        RemoteUpdate::Notice(Notice {
            level: shared::NoticeLevel::Success,
            text: text.into(),
        })
    }

    pub fn failure(context: &str, err: &CaptureError) -> Self {
        RemoteUpdate::Notice(Notice {
            level: shared::NoticeLevel::Error,
            text: format!("{}: {}", context, err),
        })
    }
}
