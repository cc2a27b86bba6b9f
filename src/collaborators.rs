//! Collaborator contracts consumed by the control plane
//!
//! The remote transcription backend, the live voice session, the confidence
//! scorer and the speech synthesizer all live behind these traits; the core
//! never sees a wire format.

use crate::audio::AudioChunk;
use crate::triggers::{TriggerDefinition, ValidationOutcome};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Voice parameters passed through to the synthesizer
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub voice: Option<String>,
    pub speed: Option<f32>,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Continuous transcription backend
///
/// Emits finalized text through whatever callback the owner wires to
/// `TriggerPipeline::process_transcript`; the core only drives its lifecycle.
pub trait TranscriptionCollaborator: Send + Sync {
    fn send_audio(&self, chunk: &AudioChunk) -> Result<()>;

    /// Stop interpreting audio without tearing down the connection
    fn pause(&self) -> Result<()>;

    fn resume(&self) -> Result<()>;

    fn connect(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    fn is_connected(&self) -> bool;
}

/// Live two-way voice session backend
pub trait SessionCollaborator: Send + Sync {
    /// Start a session seeded with conversational context.
    ///
    /// Returns `Ok(false)` when the backend declines the session; that is a
    /// rollback condition, not an error.
    fn start(&self, context: &str) -> Result<bool>;

    fn send_audio(&self, chunk: &AudioChunk) -> Result<()>;

    fn is_active(&self) -> bool;

    fn end(&self) -> Result<()>;
}

/// External confidence scorer for trigger validation
///
/// Called only from the validation pool and bounded by the pipeline's
/// per-validation timeout; a slow call is abandoned, never interrupted.
pub trait ValidationCollaborator: Send + Sync {
    fn validate(&self, trigger: &TriggerDefinition, context: &str) -> Result<ValidationOutcome>;
}

/// Text-to-speech output, invoked by the trigger executor
pub trait SpeechSynthesizer: Send + Sync {
    fn speak(&self, text: &str, settings: &VoiceSettings) -> Result<()>;
}
