use thiserror::Error;

use crate::detection::infrastructure::cascade_face_detector::CascadeError;
use crate::recognition::infrastructure::lbph_recognizer::LbphError;
use crate::shared::region::RegionError;

/// Fatal failures of a capture session.
///
/// Everything that can go wrong inside a single frame iteration is logged
/// and skipped instead.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera {port} is unavailable: {reason}")]
    CameraUnavailable { port: String, reason: String },

    #[error("camera reported unusable dimensions: {0}")]
    InvalidDimensions(#[from] RegionError),

    #[error("capture session already ended; create a new worker")]
    SessionConsumed,

    #[error("capture worker is already running")]
    AlreadyRunning,

    #[error("capture worker thread panicked")]
    WorkerPanicked,

    #[error("failed to spawn capture worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to load face cascade: {0}")]
    Cascade(#[from] CascadeError),

    #[error("failed to load face recognizer: {0}")]
    Recognizer(#[from] LbphError),
}
