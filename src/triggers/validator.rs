//! Validation worker pool
//!
//! A small fixed pool runs confidence validations against the external
//! scorer. Cancellation is cooperative: a token is checked before the call
//! and again after it, and a stale result is simply never delivered.

use crate::collaborators::ValidationCollaborator;
use crate::triggers::TriggerDefinition;
use crate::{HarkError, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of scoring one trigger against the conversation context
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    #[serde(default)]
    pub triggered: bool,

    #[serde(default)]
    pub confidence: f32,

    #[serde(default)]
    pub reason: String,
}

impl ValidationOutcome {
    pub fn not_triggered(reason: impl Into<String>) -> Self {
        Self {
            triggered: false,
            confidence: 0.0,
            reason: reason.into(),
        }
    }

    /// Parse a scorer payload, tolerating markdown code fences around the
    /// JSON body
    pub fn from_json(payload: &str) -> Result<Self> {
        let mut cleaned = payload.trim();
        if let Some(rest) = cleaned.strip_prefix("```json") {
            cleaned = rest;
        } else if let Some(rest) = cleaned.strip_prefix("```") {
            cleaned = rest;
        }
        if let Some(rest) = cleaned.strip_suffix("```") {
            cleaned = rest;
        }
        let cleaned = cleaned.trim();

        let parsed: std::result::Result<Self, _> = serde_json::from_str(cleaned);
        let mut outcome = match parsed {
            Ok(o) => o,
            Err(e) => {
                // Last resort: pull the first object out of surrounding prose
                let start = cleaned.find('{');
                let end = cleaned.rfind('}');
                match (start, end) {
                    (Some(s), Some(e2)) if e2 > s => {
                        serde_json::from_str(&cleaned[s..=e2]).map_err(|_| {
                            HarkError::ValidationError(format!("unparseable payload: {}", e))
                        })?
                    }
                    _ => {
                        return Err(HarkError::ValidationError(format!(
                            "unparseable payload: {}",
                            e
                        )))
                    }
                }
            }
        };
        outcome.confidence = outcome.confidence.clamp(0.0, 1.0);
        Ok(outcome)
    }
}

/// One validation to run on the pool
pub struct ValidationJob {
    pub trigger: Arc<TriggerDefinition>,
    pub context: String,
    pub cancelled: Arc<AtomicBool>,
    pub result_tx: Sender<(Arc<TriggerDefinition>, ValidationOutcome)>,
}

/// Fixed-size pool of validation workers
pub struct ValidationPool {
    job_tx: Mutex<Option<Sender<ValidationJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    done_rx: Receiver<()>,
    worker_count: usize,
}

impl ValidationPool {
    pub fn new(worker_count: usize, collaborator: Arc<dyn ValidationCollaborator>) -> Self {
        let (job_tx, job_rx) = bounded::<ValidationJob>(worker_count * 2);
        let (done_tx, done_rx) = bounded::<()>(worker_count);

        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            let collaborator = Arc::clone(&collaborator);
            let handle = thread::Builder::new()
                .name(format!("validation-{}", i))
                .spawn(move || {
                    worker_loop(job_rx, collaborator);
                    let _ = done_tx.send(());
                })
                .expect("failed to spawn validation worker");
            workers.push(handle);
        }

        Self {
            job_tx: Mutex::new(Some(job_tx)),
            workers: Mutex::new(workers),
            done_rx,
            worker_count,
        }
    }

    /// Queue a job without blocking the caller
    ///
    /// The lock only guards the sender clone, never the send itself. When
    /// every worker is occupied and the queue is full the job fails closed:
    /// a `triggered=false` outcome is delivered immediately.
    pub fn submit(&self, job: ValidationJob) -> Result<()> {
        let tx = {
            let guard = self.job_tx.lock();
            guard
                .as_ref()
                .cloned()
                .ok_or_else(|| HarkError::ChannelError("validation pool is shut down".into()))?
        };

        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                warn!(
                    "Validation queue full, failing '{}' closed",
                    job.trigger.name()
                );
                let _ = job.result_tx.send((
                    job.trigger,
                    ValidationOutcome::not_triggered("validation queue full"),
                ));
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(HarkError::ChannelError("validation pool disconnected".into()))
            }
        }
    }

    /// Stop accepting work and join workers with a bounded timeout
    pub fn shutdown(&self, timeout: Duration) {
        self.job_tx.lock().take();

        let deadline = Instant::now() + timeout;
        for _ in 0..self.worker_count {
            if self.done_rx.recv_deadline(deadline).is_err() {
                warn!("Validation worker did not exit in time");
                break;
            }
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("Detaching stuck validation worker");
            }
        }
    }
}

fn worker_loop(job_rx: Receiver<ValidationJob>, collaborator: Arc<dyn ValidationCollaborator>) {
    for job in job_rx.iter() {
        if job.cancelled.load(Ordering::SeqCst) {
            debug!(
                "Skipping cancelled validation for '{}'",
                job.trigger.name()
            );
            continue;
        }

        let outcome = match collaborator.validate(&job.trigger, &job.context) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Validation error for '{}': {}", job.trigger.name(), e);
                ValidationOutcome::not_triggered(format!("validation error: {}", e))
            }
        };

        // The request may have been superseded while the call was in flight;
        // its result is discarded, never delivered
        if job.cancelled.load(Ordering::SeqCst) {
            debug!(
                "Discarding stale validation result for '{}'",
                job.trigger.name()
            );
            continue;
        }

        let _ = job.result_tx.send((job.trigger, outcome));
    }
}
