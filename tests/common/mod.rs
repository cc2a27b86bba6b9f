//! Shared fakes for integration tests
#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use hark::audio::{AudioChunk, CaptureDevice, CaptureError};
use hark::collaborators::{
    SessionCollaborator, SpeechSynthesizer, TranscriptionCollaborator, ValidationCollaborator,
    VoiceSettings,
};
use hark::config::{AudioConfig, PipelineConfig, TransitionConfig};
use hark::triggers::{ActionOutcome, TriggerAction, TriggerDefinition, ValidationOutcome};
use hark::{HarkError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Poll a predicate for up to two seconds
pub fn wait_for(pred: impl Fn() -> bool) -> bool {
    for _ in 0..400 {
        if pred() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Transition policy with delays shrunk for test speed
pub fn fast_transition_config() -> TransitionConfig {
    TransitionConfig {
        consumer_grace: Duration::from_millis(5),
        pause_settle: Duration::from_millis(5),
        reconnect_delay: Duration::from_millis(10),
        ..TransitionConfig::default()
    }
}

pub fn fast_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        validation_timeout: Duration::from_millis(500),
        ..PipelineConfig::default()
    }
}

/// Capture device scripted from a channel; yields transient timeouts while
/// idle and a fatal error once the sender is dropped
pub struct ScriptedDevice {
    rx: Receiver<Vec<u8>>,
}

pub fn scripted_device() -> (Sender<Vec<u8>>, Box<dyn CaptureDevice>) {
    let (tx, rx) = unbounded();
    (tx, Box::new(ScriptedDevice { rx }))
}

impl CaptureDevice for ScriptedDevice {
    fn open(&mut self, _config: &AudioConfig) -> Result<()> {
        Ok(())
    }

    fn read_chunk(&mut self) -> std::result::Result<Vec<u8>, CaptureError> {
        match self.rx.recv_timeout(Duration::from_millis(10)) {
            Ok(bytes) => Ok(bytes),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                Err(CaptureError::Transient("no data".into()))
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                Err(CaptureError::Fatal("script ended".into()))
            }
        }
    }

    fn close(&mut self) {}
}

#[derive(Default)]
pub struct TranscriberState {
    pub connected: bool,
    pub paused: bool,
    pub audio_seqs: Vec<u64>,
    pub pause_calls: u32,
    pub resume_calls: u32,
    pub connect_calls: u32,
    pub stop_calls: u32,
}

/// In-memory transcription backend
#[derive(Default)]
pub struct FakeTranscriber {
    pub state: Mutex<TranscriberState>,
    pub fail_pause: AtomicBool,
    pub fail_connect: AtomicBool,
    pub report_disconnected: AtomicBool,
}

impl TranscriptionCollaborator for FakeTranscriber {
    fn send_audio(&self, chunk: &AudioChunk) -> Result<()> {
        self.state.lock().audio_seqs.push(chunk.seq());
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        if self.fail_pause.load(Ordering::SeqCst) {
            return Err(HarkError::TranscriptionError("pause refused".into()));
        }
        let mut state = self.state.lock();
        state.paused = true;
        state.pause_calls += 1;
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.paused = false;
        state.resume_calls += 1;
        Ok(())
    }

    fn connect(&self) -> Result<()> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(HarkError::TranscriptionError("connect refused".into()));
        }
        let mut state = self.state.lock();
        state.connected = true;
        state.connect_calls += 1;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.connected = false;
        state.stop_calls += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        if self.report_disconnected.load(Ordering::SeqCst) {
            return false;
        }
        self.state.lock().connected
    }
}

/// In-memory session backend; `gate` lets a test hold `start` open while it
/// pushes audio into the transition window
pub struct FakeSession {
    pub accept: AtomicBool,
    pub active: AtomicBool,
    pub audio_seqs: Mutex<Vec<u64>>,
    pub context: Mutex<Option<String>>,
    pub start_calls: AtomicU64,
    pub gate: Mutex<Option<Receiver<()>>>,
}

impl Default for FakeSession {
    fn default() -> Self {
        Self {
            accept: AtomicBool::new(true),
            active: AtomicBool::new(false),
            audio_seqs: Mutex::new(Vec::new()),
            context: Mutex::new(None),
            start_calls: AtomicU64::new(0),
            gate: Mutex::new(None),
        }
    }
}

impl SessionCollaborator for FakeSession {
    fn start(&self, context: &str) -> Result<bool> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.recv_timeout(Duration::from_secs(2));
        }
        if !self.accept.load(Ordering::SeqCst) {
            return Ok(false);
        }
        *self.context.lock() = Some(context.to_string());
        self.active.store(true, Ordering::SeqCst);
        Ok(true)
    }

    fn send_audio(&self, chunk: &AudioChunk) -> Result<()> {
        self.audio_seqs.lock().push(chunk.seq());
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn end(&self) -> Result<()> {
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Scorer returning pre-seeded outcomes by trigger name, optionally slow
/// overall or per trigger
#[derive(Default)]
pub struct FakeScorer {
    pub outcomes: Mutex<HashMap<String, ValidationOutcome>>,
    pub delay: Mutex<Duration>,
    pub delays: Mutex<HashMap<String, Duration>>,
    pub calls: AtomicU64,
}

impl FakeScorer {
    pub fn with_outcome(self, name: &str, triggered: bool, confidence: f32) -> Self {
        self.outcomes.lock().insert(
            name.to_string(),
            ValidationOutcome {
                triggered,
                confidence,
                reason: "seeded".into(),
            },
        );
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = delay;
        self
    }

    pub fn with_delay_for(self, name: &str, delay: Duration) -> Self {
        self.delays.lock().insert(name.to_string(), delay);
        self
    }
}

impl ValidationCollaborator for FakeScorer {
    fn validate(&self, trigger: &TriggerDefinition, _context: &str) -> Result<ValidationOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self
            .delays
            .lock()
            .get(trigger.name())
            .copied()
            .unwrap_or_else(|| *self.delay.lock());
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        Ok(self
            .outcomes
            .lock()
            .get(trigger.name())
            .cloned()
            .unwrap_or_else(|| ValidationOutcome::not_triggered("not seeded")))
    }
}

/// Action recording every transcript it executed on
#[derive(Default)]
pub struct SpyAction {
    pub transcripts: Mutex<Vec<String>>,
    pub response: Mutex<Option<ActionOutcome>>,
}

impl SpyAction {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn responding(response: ActionOutcome) -> Arc<Self> {
        let action = Self::default();
        *action.response.lock() = Some(response);
        Arc::new(action)
    }

    pub fn call_count(&self) -> usize {
        self.transcripts.lock().len()
    }
}

impl TriggerAction for SpyAction {
    fn execute(&self, _outcome: &ValidationOutcome, transcript: &str) -> Result<Option<ActionOutcome>> {
        self.transcripts.lock().push(transcript.to_string());
        Ok(self.response.lock().clone())
    }
}

/// Synthesizer recording everything spoken
#[derive(Default)]
pub struct FakeSynthesizer {
    pub spoken: Mutex<Vec<String>>,
}

impl SpeechSynthesizer for FakeSynthesizer {
    fn speak(&self, text: &str, _settings: &VoiceSettings) -> Result<()> {
        self.spoken.lock().push(text.to_string());
        Ok(())
    }
}
