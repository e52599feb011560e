use serde::{Deserialize, Serialize};

/// Errors surfaced to the operator.
///
/// These cross the IPC boundary, so they carry rendered messages rather than source errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum CaptureError {
    /// A local precondition did not hold. Nothing was changed and no remote call was made.
    #[error("{0}")]
    Validation(String),

    /// A backend call failed.
    #[error("backend error: {0}")]
    Remote(String),

    /// A frame snapshot could not be encoded.
    #[error("failed to encode frame: {0}")]
    Encode(String),

    /// The capture subsystem could not be set up and stays disabled.
    #[error("capture unavailable: {0}")]
    Initialization(String),
}

impl CaptureError {
    pub fn no_hand() -> Self {
        CaptureError::Validation("no hand detected".to_string())
    }
}
