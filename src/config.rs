//! Configuration for the control plane
//!
//! Every empirically tuned timing value (grace delays, backoff, timeouts)
//! lives here as injectable policy rather than a hardcoded constant.

use crate::{HarkError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed capture format for the audio bus
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Number of input channels
    pub channels: u16,

    /// Frames per captured chunk
    pub chunk_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            channels: 1,
            chunk_size: 1024,
        }
    }
}

/// Timing and capacity policy for mode transitions
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionConfig {
    /// Maximum chunks held while a transition is in flight
    pub buffer_capacity: usize,

    /// Maximum buffered chunks flushed into a new session; excess is discarded
    pub flush_max_chunks: usize,

    /// Delay after removing a consumer before tearing down its collaborator,
    /// so in-flight deliveries drain instead of hitting a closing socket
    pub consumer_grace: Duration,

    /// Delay after pausing the transcription collaborator before proceeding
    pub pause_settle: Duration,

    /// Base delay before attempting to reconnect the transcription collaborator
    pub reconnect_delay: Duration,

    /// Maximum reconnect attempts after a rollback
    pub reconnect_max_retries: u32,

    /// Multiplier applied to the reconnect delay between attempts
    pub reconnect_backoff_factor: f64,

    /// How long to wait for worker threads when joining at shutdown
    pub join_timeout: Duration,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 100,
            flush_max_chunks: 100,
            consumer_grace: Duration::from_millis(100),
            pause_settle: Duration::from_millis(200),
            reconnect_delay: Duration::from_secs(2),
            reconnect_max_retries: 3,
            reconnect_backoff_factor: 2.0,
            join_timeout: Duration::from_secs(2),
        }
    }
}

/// Policy for the trigger pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Age after which transcript entries fall out of the context window
    pub context_window: Duration,

    /// Per-request budget for collecting validation results
    pub validation_timeout: Duration,

    /// Worker threads in the validation pool
    pub validation_workers: usize,

    /// Transcript length cap applied during sanitization
    pub max_transcript_len: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            context_window: Duration::from_secs(60),
            validation_timeout: Duration::from_secs(8),
            validation_workers: 3,
            max_transcript_len: 1000,
        }
    }
}

/// Top-level configuration for the control plane
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HarkConfig {
    pub audio: AudioConfig,
    pub transition: TransitionConfig,
    pub pipeline: PipelineConfig,
}

impl HarkConfig {
    pub fn with_audio(mut self, audio: AudioConfig) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_transition(mut self, transition: TransitionConfig) -> Self {
        self.transition = transition;
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.audio.chunk_size == 0 {
            return Err(HarkError::ConfigError("chunk_size must be non-zero".into()));
        }
        if self.audio.channels == 0 {
            return Err(HarkError::ConfigError("channels must be non-zero".into()));
        }
        if self.transition.buffer_capacity == 0 {
            return Err(HarkError::ConfigError(
                "transition buffer_capacity must be non-zero".into(),
            ));
        }
        if self.pipeline.validation_workers == 0 {
            return Err(HarkError::ConfigError(
                "validation_workers must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
