pub mod audio;
pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod triggers;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum HarkError {
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    #[error("Capture error: {0}")]
    CaptureError(String),

    #[error("Consumer error: {0}")]
    ConsumerError(String),

    #[error("Transcription error: {0}")]
    TranscriptionError(String),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("TTS error: {0}")]
    TTSError(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl From<std::io::Error> for HarkError {
    fn from(e: std::io::Error) -> Self {
        HarkError::IOError(e.to_string())
    }
}

impl HarkError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Hardware/device errors may require user intervention
            HarkError::AudioDeviceError(_) => false,
            // Capture glitches are retried at the point of origin
            HarkError::CaptureError(_) => true,
            // A broken consumer is isolated, not fatal
            HarkError::ConsumerError(_) => true,
            HarkError::TranscriptionError(_) => true,
            HarkError::SessionError(_) => true,
            HarkError::ValidationError(_) => true,
            HarkError::ExecutionError(_) => true,
            HarkError::TTSError(_) => true,
            HarkError::IOError(_) => false,
            HarkError::ConfigError(_) => false,
            HarkError::ChannelError(_) => false,
            HarkError::PipelineError(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, HarkError>;
