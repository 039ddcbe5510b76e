use thiserror::Error;

use crate::pose::{Backend, Role};

/// Per-request measurement failure.
///
/// Every variant ends up as `{"status": "error", "message": ...}` in the response envelope,
/// so the `Display` text is the message shown to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasureError {
    #[error("No image data received")]
    MissingImageData,

    #[error("DecodeFailure: {0}")]
    DecodeFailure(String),

    #[error("NoBodyDetected")]
    NoBodyDetected,

    #[error("MissingLandmarkRole: {0}")]
    MissingLandmarkRole(Role),

    #[error("MissingDepth: {0} has no depth coordinate")]
    MissingDepth(Role),

    #[error("InvalidCalibration: {0}")]
    InvalidCalibration(String),

    #[error("DegenerateVector: {0}")]
    DegenerateVector(String),

    #[error("BackendUnavailable: no provider registered for {0}")]
    BackendUnavailable(Backend),

    #[error("Inference: {0}")]
    Inference(String),
}

pub type MeasureResult<T> = std::result::Result<T, MeasureError>;
