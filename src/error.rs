use thiserror::Error;

#[derive(Debug, Error)]
pub enum CardError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("microphone unavailable: {0}")]
    MicrophoneUnavailable(String),

    #[error("asset not found: {0}")]
    MissingAsset(String),

    #[error("playback rejected for {src}: {reason}")]
    PlaybackRejected { src: String, reason: String },

    #[error("hand detector failed: {0}")]
    Detector(String),

    #[error("invalid manifest: {0}")]
    Manifest(String),
}

pub type CardResult<T> = std::result::Result<T, CardError>;
