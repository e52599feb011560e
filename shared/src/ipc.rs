use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::error::CaptureError;
use crate::types::{
    DaemonStatus, DetectorOptions, DetectorPreset, Model, Prediction, RecordingInterval,
    SamplesSummary, Selection,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    StartRecording,
    StopRecording,
    SetInterval(u64),
    SelectCategory(String),
    SelectLabel(String),
    CaptureSample,
    Predict { model: String },
    ListSamples,
    ClearSamples,
    Train { name: String },
    ListModels,
    DeleteModel { name: String },
    ApplyPreset(DetectorPreset),
    GetStatus,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonMessage {
    RecordingStarted {
        session_id: Uuid,
        label: String,
        interval: RecordingInterval,
    },
    RecordingStopped {
        captures: u64,
    },
    /// `applied` is false when the request was ignored because a session is active.
    Interval {
        interval: RecordingInterval,
        applied: bool,
    },
    Selection(Selection),
    SampleCaptured {
        label: String,
    },
    Prediction(Prediction),
    Samples(SamplesSummary),
    SamplesCleared,
    ModelTrained(Model),
    Models(Vec<Model>),
    ModelDeleted(String),
    DetectorConfigured(DetectorOptions),
    Status(DaemonStatus),
    ShuttingDown,
    Error(CaptureError),
}

pub mod protocol {
    use super::*;
    use anyhow::Result;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    /// Frames larger than this are rejected rather than allocated.
    const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

    pub async fn send_message<S, T>(stream: &mut S, message: &T) -> Result<()>
    where
        S: AsyncWrite + Unpin,
        T: Serialize,
    {
        let serialized = rmp_serde::to_vec(message)?;
        let len = serialized.len() as u32;

        stream.write_all(&len.to_le_bytes()).await?;
        stream.write_all(&serialized).await?;
        stream.flush().await?;

        Ok(())
    }

    pub async fn receive_message<S, T>(stream: &mut S) -> Result<T>
    where
        S: AsyncRead + Unpin,
        T: for<'de> Deserialize<'de>,
    {
        let mut len_bytes = [0u8; 4];
        stream.read_exact(&mut len_bytes).await?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_MESSAGE_LEN {
            anyhow::bail!("IPC message of {} bytes exceeds the {} byte limit", len, MAX_MESSAGE_LEN);
        }

        let mut buffer = vec![0u8; len];
        stream.read_exact(&mut buffer).await?;

        let message = rmp_serde::from_slice(&buffer)?;
        Ok(message)
    }
}
