//! Two-stage trigger pipeline
//!
//! Stage 1 is synchronous keyword matching over sanitized transcripts.
//! Stage 2 validates every matched candidate asynchronously and executes at
//! most one winner, with barge-in semantics: a newer utterance supersedes any
//! request still awaiting validation.

use crate::collaborators::ValidationCollaborator;
use crate::config::PipelineConfig;
use crate::triggers::executor::select_winner;
use crate::triggers::validator::ValidationJob;
use crate::triggers::{
    sanitize_transcript, ContextWindow, LatestSlot, SequenceCounter, TriggerExecutor,
    TriggerRegistry, ValidationPool, ValidationRequest,
};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Snapshot of pipeline counters
#[derive(Clone, Debug, Default)]
pub struct PipelineStats {
    /// Transcripts admitted past sanitization
    pub processed: u64,

    /// Transcripts with at least one keyword match
    pub matched: u64,

    /// Requests dropped because a newer one superseded them
    pub superseded: u64,

    /// Individual validations that missed the deadline
    pub timed_out: u64,

    /// Winning actions handed to the executor
    pub executed: u64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    matched: AtomicU64,
    superseded: AtomicU64,
    timed_out: AtomicU64,
    executed: AtomicU64,
}

struct PendingRequest {
    request: ValidationRequest,
    cancel: Arc<AtomicBool>,
}

struct Worker {
    handle: JoinHandle<()>,
    done_rx: Receiver<()>,
}

pub struct TriggerPipeline {
    config: PipelineConfig,
    registry: Arc<TriggerRegistry>,
    window: Arc<ContextWindow>,
    executor: Arc<TriggerExecutor>,
    pool: Arc<ValidationPool>,
    seq: Arc<SequenceCounter>,
    slot: Arc<LatestSlot<PendingRequest>>,
    current_cancel: Arc<Mutex<Option<Arc<AtomicBool>>>>,
    worker: Mutex<Option<Worker>>,
    counters: Arc<Counters>,
}

impl TriggerPipeline {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<TriggerRegistry>,
        collaborator: Arc<dyn ValidationCollaborator>,
        executor: Arc<TriggerExecutor>,
    ) -> Self {
        let pool = Arc::new(ValidationPool::new(config.validation_workers, collaborator));
        let window = Arc::new(ContextWindow::new(config.context_window));
        Self {
            config,
            registry,
            window,
            executor,
            pool,
            seq: Arc::new(SequenceCounter::new()),
            slot: Arc::new(LatestSlot::new()),
            current_cancel: Arc::new(Mutex::new(None)),
            worker: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Spawn the worker loop; idempotent if already running
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }

        let (done_tx, done_rx) = bounded::<()>(1);
        let slot = Arc::clone(&self.slot);
        let seq = Arc::clone(&self.seq);
        let window = Arc::clone(&self.window);
        let pool = Arc::clone(&self.pool);
        let executor = Arc::clone(&self.executor);
        let counters = Arc::clone(&self.counters);
        let timeout = self.config.validation_timeout;

        let handle = thread::Builder::new()
            .name("trigger-pipeline".into())
            .spawn(move || {
                worker_loop(slot, seq, window, pool, executor, counters, timeout);
                let _ = done_tx.send(());
            })
            .expect("failed to spawn trigger pipeline worker");

        *worker = Some(Worker { handle, done_rx });
        info!("Trigger pipeline started");
    }

    /// Feed one finalized transcript through stage 1
    pub fn process_transcript(&self, text: &str) {
        let Some(clean) = sanitize_transcript(text, self.config.max_transcript_len) else {
            return;
        };

        self.window.push(clean.clone());
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        let candidates = self.registry.matching(&clean);
        if candidates.is_empty() {
            debug!("No triggers matched: '{}'", clean);
            return;
        }
        self.counters.matched.fetch_add(1, Ordering::Relaxed);
        info!(
            "{} trigger(s) matched '{}', queuing validation",
            candidates.len(),
            clean
        );

        // Sequence issue, cancel swap, and publish form one atomic step;
        // the slot always holds the highest sequence number issued so far
        let mut current = self.current_cancel.lock();
        let seq = self.seq.next();
        let cancel = Arc::new(AtomicBool::new(false));

        // Supersede: anything still validating belongs to an older utterance
        if let Some(previous) = current.replace(Arc::clone(&cancel)) {
            previous.store(true, Ordering::SeqCst);
        }

        let request = ValidationRequest::new(clean, candidates, seq);
        if let Some(stale) = self.slot.publish(PendingRequest { request, cancel }) {
            self.counters.superseded.fetch_add(1, Ordering::Relaxed);
            debug!("Superseded queued request #{}", stale.request.seq);
        }
    }

    /// Current conversational context from the rolling window
    pub fn context(&self) -> String {
        self.window.context()
    }

    pub fn clear_context(&self) {
        self.window.clear();
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            matched: self.counters.matched.load(Ordering::Relaxed),
            superseded: self.counters.superseded.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            executed: self.counters.executed.load(Ordering::Relaxed),
        }
    }

    /// Stop the worker, dropping any pending request, then stop the pool
    pub fn shutdown(&self) {
        info!("Shutting down trigger pipeline");

        if let Some(token) = self.current_cancel.lock().take() {
            token.store(true, Ordering::SeqCst);
        }
        self.slot.close();

        if let Some(worker) = self.worker.lock().take() {
            match worker.done_rx.recv_timeout(SHUTDOWN_JOIN_TIMEOUT) {
                Ok(()) => {
                    let _ = worker.handle.join();
                }
                Err(_) => warn!("Pipeline worker did not exit in time"),
            }
        }

        self.pool.shutdown(SHUTDOWN_JOIN_TIMEOUT);
        info!("Trigger pipeline shutdown complete");
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    slot: Arc<LatestSlot<PendingRequest>>,
    seq: Arc<SequenceCounter>,
    window: Arc<ContextWindow>,
    pool: Arc<ValidationPool>,
    executor: Arc<TriggerExecutor>,
    counters: Arc<Counters>,
    timeout: Duration,
) {
    while let Some(pending) = slot.recv() {
        // Cheap short-circuit before any external call
        if pending.request.seq != seq.latest() {
            counters.superseded.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Skipping request #{}; #{} is newer",
                pending.request.seq,
                seq.latest()
            );
            continue;
        }

        let context = window.context();
        let candidate_count = pending.request.candidates.len();
        let (result_tx, result_rx) = bounded(candidate_count);

        debug!(
            "Validating {} candidate(s) for request #{}",
            candidate_count, pending.request.seq
        );
        for trigger in &pending.request.candidates {
            let job = ValidationJob {
                trigger: Arc::clone(trigger),
                context: context.clone(),
                cancelled: Arc::clone(&pending.cancel),
                result_tx: result_tx.clone(),
            };
            if let Err(e) = pool.submit(job) {
                warn!("Failed to submit validation job: {}", e);
            }
        }
        drop(result_tx);

        let deadline = Instant::now() + timeout;
        let mut results = Vec::with_capacity(candidate_count);
        loop {
            if results.len() == candidate_count {
                break;
            }
            // Bail out early when a newer utterance cancelled this request
            if pending.cancel.load(Ordering::SeqCst) {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                let missing = (candidate_count - results.len()) as u64;
                counters.timed_out.fetch_add(missing, Ordering::Relaxed);
                debug!("{} validation(s) missed the deadline", missing);
                break;
            }
            let step = RESULT_POLL_INTERVAL.min(deadline - now);
            match result_rx.recv_timeout(step) {
                Ok(result) => results.push(result),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // The wait may have outlived this request's claim to being newest
        if pending.request.seq != seq.latest() {
            counters.superseded.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Discarding results of request #{}; superseded during validation",
                pending.request.seq
            );
            continue;
        }

        match select_winner(&results) {
            Some((trigger, outcome)) => {
                counters.executed.fetch_add(1, Ordering::Relaxed);
                executor.execute(&pending.request, trigger, outcome);
            }
            None => debug!("No triggers validated for request #{}", pending.request.seq),
        }
    }

    debug!("Trigger pipeline worker exited");
}
