//! Mode transition coordinator
//!
//! Transactionally switches which consumer owns the audio bus (transcription
//! vs. live session). Audio captured mid-switch lands in a bounded transition
//! buffer; a successful switch flushes it into the new session in capture
//! order, a failed switch discards it and rolls back to the source mode.

use crate::audio::{AudioBroadcastBus, AudioChunk, AudioConsumer, TransitionBuffer};
use crate::collaborators::{SessionCollaborator, TranscriptionCollaborator};
use crate::config::TransitionConfig;
use crate::coordinator::{Mode, ModeCell};
use crate::{HarkError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

/// Bus identity of the transcription consumer
pub const TRANSCRIPTION_CONSUMER: &str = "transcription";

/// Bus identity of the live-session consumer
pub const SESSION_CONSUMER: &str = "session";

/// Bus identity of the transient buffering consumer
pub const BUFFER_CONSUMER: &str = "transition-buffer";

const HISTORY_LIMIT: usize = 100;

/// Capability handed to trigger actions that want to switch modes
pub trait ModeControl: Send + Sync {
    fn start_assistant(&self) -> bool;

    fn end_assistant(&self) -> bool;

    fn current_mode(&self) -> Mode;
}

/// One recorded mode transition, for diagnostics
#[derive(Clone, Debug)]
pub struct TransitionRecord {
    pub from: Mode,
    pub to: Mode,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Snapshot of coordinator counters
#[derive(Clone, Debug)]
pub struct CoordinatorStats {
    pub current_mode: Mode,
    pub mode_changes: u64,
    pub rollbacks: u64,
    pub buffer_overflows: u64,
}

/// Transient consumer that appends into the transition buffer
struct BufferConsumer {
    buffer: TransitionBuffer,
    active: AtomicBool,
}

impl BufferConsumer {
    fn new(buffer: TransitionBuffer) -> Self {
        Self {
            buffer,
            active: AtomicBool::new(true),
        }
    }

    /// Stop accepting chunks; a delivery already past the snapshot can still
    /// arrive after removal
    fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl AudioConsumer for BufferConsumer {
    fn name(&self) -> &str {
        BUFFER_CONSUMER
    }

    fn deliver(&self, chunk: &AudioChunk) -> Result<()> {
        if self.active.load(Ordering::SeqCst) {
            self.buffer.push(chunk.clone());
        }
        Ok(())
    }
}

/// Bus consumer forwarding chunks to the transcription backend
struct TranscriberConsumer {
    transcriber: Arc<dyn TranscriptionCollaborator>,
}

impl AudioConsumer for TranscriberConsumer {
    fn name(&self) -> &str {
        TRANSCRIPTION_CONSUMER
    }

    fn deliver(&self, chunk: &AudioChunk) -> Result<()> {
        self.transcriber.send_audio(chunk)
    }
}

/// Bus consumer forwarding chunks to the live session
struct SessionConsumer {
    session: Arc<dyn SessionCollaborator>,
}

impl AudioConsumer for SessionConsumer {
    fn name(&self) -> &str {
        SESSION_CONSUMER
    }

    fn deliver(&self, chunk: &AudioChunk) -> Result<()> {
        self.session.send_audio(chunk)
    }
}

type ModeListener = Arc<dyn Fn(Mode) + Send + Sync>;
type ContextSource = Box<dyn Fn() -> String + Send + Sync>;

pub struct ModeCoordinator {
    bus: Arc<AudioBroadcastBus>,
    transcriber: Arc<dyn TranscriptionCollaborator>,
    session: Arc<dyn SessionCollaborator>,
    context_source: ContextSource,
    config: TransitionConfig,
    mode: ModeCell,
    listeners: Mutex<Vec<ModeListener>>,
    history: Mutex<VecDeque<TransitionRecord>>,
    mode_changes: AtomicU64,
    rollbacks: AtomicU64,
    buffer_overflows: AtomicU64,
}

impl ModeCoordinator {
    pub fn new(
        bus: Arc<AudioBroadcastBus>,
        transcriber: Arc<dyn TranscriptionCollaborator>,
        session: Arc<dyn SessionCollaborator>,
        context_source: ContextSource,
        config: TransitionConfig,
    ) -> Self {
        Self {
            bus,
            transcriber,
            session,
            context_source,
            config,
            mode: ModeCell::new(Mode::Transcription),
            listeners: Mutex::new(Vec::new()),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT)),
            mode_changes: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            buffer_overflows: AtomicU64::new(0),
        }
    }

    /// Register a mode-change listener; always invoked outside internal locks
    pub fn on_mode_change(&self, listener: impl Fn(Mode) + Send + Sync + 'static) {
        self.listeners.lock().push(Arc::new(listener));
    }

    pub fn mode(&self) -> Mode {
        self.mode.get()
    }

    /// Connect the transcription backend and attach it to the bus
    pub fn start(&self) -> Result<()> {
        self.transcriber.connect()?;
        self.bus.add_consumer(Arc::new(TranscriberConsumer {
            transcriber: Arc::clone(&self.transcriber),
        }));
        info!("Coordinator started in transcription mode");
        Ok(())
    }

    /// Switch from transcription to a live assistant session
    ///
    /// Returns `false` with no side effects unless the current mode is
    /// `Transcription`; concurrent and duplicate calls are rejected, never
    /// queued.
    pub fn start_assistant_mode(&self) -> bool {
        if !self
            .mode
            .compare_and_swap(Mode::Transcription, Mode::Transitioning)
        {
            debug!("Cannot start assistant mode from {}", self.mode.get());
            return false;
        }
        self.mode_changes.fetch_add(1, Ordering::Relaxed);
        self.notify(Mode::Transitioning);

        let buffer = TransitionBuffer::new(self.config.buffer_capacity);
        let buffering = Arc::new(BufferConsumer::new(buffer.clone()));
        self.bus.add_consumer(buffering.clone());

        let result = self.try_enter_assistant();

        // Stop buffering before deciding whether to flush or discard
        self.bus.remove_consumer(BUFFER_CONSUMER);
        buffering.deactivate();
        self.buffer_overflows
            .fetch_add(buffer.overflows(), Ordering::Relaxed);

        match result {
            Ok(()) => {
                self.flush_buffer_to_session(&buffer);
                self.bus.add_consumer(Arc::new(SessionConsumer {
                    session: Arc::clone(&self.session),
                }));
                if !self
                    .mode
                    .compare_and_swap(Mode::Transitioning, Mode::Assistant)
                {
                    warn!("Mode changed out from under an in-flight transition");
                }
                self.record(Mode::Transcription, Mode::Assistant, "assistant session started");
                self.notify(Mode::Assistant);
                info!("Transitioned to assistant mode");
                true
            }
            Err(e) => {
                warn!("Assistant transition failed, rolling back: {}", e);
                buffer.clear();
                self.rollback_to_transcription();
                if !self
                    .mode
                    .compare_and_swap(Mode::Transitioning, Mode::Transcription)
                {
                    warn!("Mode changed out from under a rollback");
                }
                self.rollbacks.fetch_add(1, Ordering::Relaxed);
                self.record(
                    Mode::Transitioning,
                    Mode::Transcription,
                    &format!("rollback: {}", e),
                );
                self.notify(Mode::Transcription);
                false
            }
        }
    }

    /// Switch from the assistant session back to transcription
    pub fn end_assistant_mode(&self) -> bool {
        if !self
            .mode
            .compare_and_swap(Mode::Assistant, Mode::Transitioning)
        {
            debug!("Not in assistant mode (current: {})", self.mode.get());
            return false;
        }
        self.mode_changes.fetch_add(1, Ordering::Relaxed);
        self.notify(Mode::Transitioning);

        let buffer = TransitionBuffer::new(self.config.buffer_capacity);
        let buffering = Arc::new(BufferConsumer::new(buffer.clone()));
        self.bus.add_consumer(buffering.clone());

        let result = self.try_exit_assistant();

        self.bus.remove_consumer(BUFFER_CONSUMER);
        buffering.deactivate();
        self.buffer_overflows
            .fetch_add(buffer.overflows(), Ordering::Relaxed);
        // Returning to transcription the buffer is always discarded; the
        // transcriber picks up live audio instead
        buffer.clear();

        match result {
            Ok(()) => {
                if !self
                    .mode
                    .compare_and_swap(Mode::Transitioning, Mode::Transcription)
                {
                    warn!("Mode changed out from under an in-flight transition");
                }
                self.record(Mode::Assistant, Mode::Transcription, "assistant session ended");
                self.notify(Mode::Transcription);
                info!("Returned to transcription mode");
                true
            }
            Err(e) => {
                warn!("Failed to end assistant mode: {}", e);
                if !self
                    .mode
                    .compare_and_swap(Mode::Transitioning, Mode::Assistant)
                {
                    warn!("Mode changed out from under a rollback");
                }
                self.rollbacks.fetch_add(1, Ordering::Relaxed);
                self.record(
                    Mode::Transitioning,
                    Mode::Assistant,
                    &format!("rollback: {}", e),
                );
                self.notify(Mode::Assistant);
                false
            }
        }
    }

    /// Tear everything down; the coordinator ends in the terminal
    /// `Disconnected` mode
    pub fn shutdown(&self) {
        info!("Shutting down coordinator");
        if self.mode.get() == Mode::Assistant {
            let _ = self.end_assistant_mode();
        }
        if let Err(e) = self.transcriber.stop() {
            warn!("Error stopping transcriber: {}", e);
        }
        self.mode.force(Mode::Disconnected);
        self.notify(Mode::Disconnected);
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            current_mode: self.mode.get(),
            mode_changes: self.mode_changes.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            buffer_overflows: self.buffer_overflows.load(Ordering::Relaxed),
        }
    }

    /// Recent transition records, oldest first
    pub fn history(&self) -> Vec<TransitionRecord> {
        self.history.lock().iter().cloned().collect()
    }

    fn try_enter_assistant(&self) -> Result<()> {
        // Removal must fully settle before pausing the transcriber, so no
        // chunk lands in a socket that is mid-close
        self.bus.remove_consumer(TRANSCRIPTION_CONSUMER);
        thread::sleep(self.config.consumer_grace);

        debug!("Pausing transcription");
        self.transcriber.pause()?;
        thread::sleep(self.config.pause_settle);

        let context = (self.context_source)();
        debug!("Starting session with {} chars of context", context.len());
        let started = self.session.start(&context)?;
        if !started {
            return Err(HarkError::SessionError("session declined to start".into()));
        }
        Ok(())
    }

    fn try_exit_assistant(&self) -> Result<()> {
        self.bus.remove_consumer(SESSION_CONSUMER);
        thread::sleep(self.config.consumer_grace);

        if self.session.is_active() {
            debug!("Closing session");
            self.session.end()?;
        } else {
            debug!("Session already closed");
        }

        self.transcriber.resume()?;
        self.bus.add_consumer(Arc::new(TranscriberConsumer {
            transcriber: Arc::clone(&self.transcriber),
        }));
        Ok(())
    }

    /// Restore transcription after a failed switch; the consumer is
    /// re-attached exactly once, immediately when the backend is still
    /// connected or from the reconnect thread otherwise
    fn rollback_to_transcription(&self) {
        if let Err(e) = self.transcriber.resume() {
            warn!("Error resuming transcriber during rollback: {}", e);
        }

        if self.transcriber.is_connected() {
            self.bus.add_consumer(Arc::new(TranscriberConsumer {
                transcriber: Arc::clone(&self.transcriber),
            }));
            return;
        }

        let transcriber = Arc::clone(&self.transcriber);
        let bus = Arc::clone(&self.bus);
        let mut delay = self.config.reconnect_delay;
        let factor = self.config.reconnect_backoff_factor;
        let retries = self.config.reconnect_max_retries;

        let spawned = thread::Builder::new()
            .name("transcriber-reconnect".into())
            .spawn(move || {
                for attempt in 1..=retries {
                    thread::sleep(delay);
                    info!("Transcriber reconnect attempt {}/{}", attempt, retries);
                    match transcriber.connect() {
                        Ok(()) => {
                            bus.add_consumer(Arc::new(TranscriberConsumer {
                                transcriber: Arc::clone(&transcriber),
                            }));
                            info!("Transcriber reconnected");
                            return;
                        }
                        Err(e) => {
                            warn!("Reconnect failed: {}", e);
                            delay = delay.mul_f64(factor);
                        }
                    }
                }
                error!("Transcriber reconnect gave up after {} attempts", retries);
            });
        if let Err(e) = spawned {
            error!("Failed to spawn reconnect thread: {}", e);
        }
    }

    fn flush_buffer_to_session(&self, buffer: &TransitionBuffer) {
        let chunks = buffer.drain();
        let total = chunks.len();
        let mut sent = 0usize;

        for chunk in chunks.into_iter().take(self.config.flush_max_chunks) {
            if let Err(e) = self.session.send_audio(&chunk) {
                warn!("Error flushing buffered audio to session: {}", e);
                break;
            }
            sent += 1;
        }

        if total > sent {
            warn!("Flushed {} buffered chunks, discarded {}", sent, total - sent);
        } else {
            debug!("Flushed {} buffered chunks to session", sent);
        }
    }

    fn record(&self, from: Mode, to: Mode, reason: &str) {
        let mut history = self.history.lock();
        if history.len() >= HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(TransitionRecord {
            from,
            to,
            reason: reason.to_string(),
            at: Utc::now(),
        });
    }

    fn notify(&self, mode: Mode) {
        // Snapshot so callbacks never run under the lock
        let listeners: Vec<ModeListener> = self.listeners.lock().clone();
        for listener in &listeners {
            listener(mode);
        }
    }
}

impl ModeControl for Arc<ModeCoordinator> {
    fn start_assistant(&self) -> bool {
        self.start_assistant_mode()
    }

    fn end_assistant(&self) -> bool {
        self.end_assistant_mode()
    }

    fn current_mode(&self) -> Mode {
        self.mode()
    }
}
