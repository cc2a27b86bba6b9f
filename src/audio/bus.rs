//! Audio broadcast bus
//!
//! Owns the capture device and fans every captured chunk out to a dynamic set
//! of consumers. One broken consumer never halts capture or starves the
//! others; it is marked failed and skipped until re-registered or removed.

use crate::audio::{AudioChunk, CaptureDevice, CaptureError};
use crate::config::AudioConfig;
use crate::{HarkError, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(100);
const RETRY_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// A registered recipient of broadcast audio
///
/// Identity is the name; `deliver` must not block for long, and an `Err`
/// marks the consumer failed.
pub trait AudioConsumer: Send + Sync {
    fn name(&self) -> &str;

    fn deliver(&self, chunk: &AudioChunk) -> Result<()>;
}

/// Snapshot of bus counters
#[derive(Clone, Debug, Default)]
pub struct BusStats {
    pub chunks_captured: u64,
    pub delivery_errors: u64,
    pub failed_consumers: usize,
    pub consumer_count: usize,
    pub is_running: bool,
    pub is_paused: bool,
}

#[derive(Default)]
struct ConsumerRegistry {
    consumers: Vec<Arc<dyn AudioConsumer>>,
    failed: HashSet<String>,
    paused: Option<Vec<Arc<dyn AudioConsumer>>>,
}

struct CaptureLoop {
    handle: JoinHandle<()>,
    done_rx: Receiver<()>,
}

pub struct AudioBroadcastBus {
    config: AudioConfig,
    registry: Arc<Mutex<ConsumerRegistry>>,
    running: Arc<AtomicBool>,
    device: Mutex<Option<Box<dyn CaptureDevice>>>,
    capture_loop: Mutex<Option<CaptureLoop>>,
    join_timeout: Duration,
    chunks_captured: Arc<AtomicU64>,
    delivery_errors: Arc<AtomicU64>,
}

impl AudioBroadcastBus {
    pub fn new(config: AudioConfig, device: Box<dyn CaptureDevice>) -> Self {
        Self {
            config,
            registry: Arc::new(Mutex::new(ConsumerRegistry::default())),
            running: Arc::new(AtomicBool::new(false)),
            device: Mutex::new(Some(device)),
            capture_loop: Mutex::new(None),
            join_timeout: Duration::from_secs(2),
            chunks_captured: Arc::new(AtomicU64::new(0)),
            delivery_errors: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Register a consumer; re-registering a name clears its failed flag
    pub fn add_consumer(&self, consumer: Arc<dyn AudioConsumer>) {
        let name = consumer.name().to_string();
        let mut registry = self.registry.lock();
        registry.failed.remove(&name);
        if let Some(existing) = registry
            .consumers
            .iter_mut()
            .find(|c| c.name() == name)
        {
            *existing = consumer;
        } else {
            registry.consumers.push(consumer);
        }
        debug!("Consumer registered: {}", name);
    }

    /// Remove a consumer by name; unknown names are a no-op
    pub fn remove_consumer(&self, name: &str) {
        let mut registry = self.registry.lock();
        registry.consumers.retain(|c| c.name() != name);
        registry.failed.remove(name);
        debug!("Consumer removed: {}", name);
    }

    /// Start the capture loop; idempotent if already running
    pub fn start(&self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut device = self
            .device
            .lock()
            .take()
            .ok_or_else(|| HarkError::AudioDeviceError("Capture device already in use".into()))?;
        if let Err(e) = device.open(&self.config) {
            // Put the device back so a later start can retry
            *self.device.lock() = Some(device);
            return Err(e);
        }

        self.running.store(true, Ordering::SeqCst);

        let (done_tx, done_rx) = bounded::<()>(1);
        let running = Arc::clone(&self.running);
        let registry = Arc::clone(&self.registry);
        let chunks_captured = Arc::clone(&self.chunks_captured);
        let delivery_errors = Arc::clone(&self.delivery_errors);

        let handle = thread::Builder::new()
            .name("audio-bus".into())
            .spawn(move || {
                capture_loop(
                    device,
                    running,
                    registry,
                    chunks_captured,
                    delivery_errors,
                    done_tx,
                );
            })
            .map_err(|e| HarkError::AudioDeviceError(format!("Failed to spawn capture loop: {}", e)))?;

        *self.capture_loop.lock() = Some(CaptureLoop { handle, done_rx });
        info!(
            "Audio bus started ({} Hz, {} ch, {} frames/chunk)",
            self.config.sample_rate, self.config.channels, self.config.chunk_size
        );
        Ok(())
    }

    /// Stop the capture loop, join it with a bounded timeout, then clear
    /// consumers and release the device
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(capture_loop) = self.capture_loop.lock().take() {
            // The loop closes the device and signals done on its way out; only
            // after that is it safe to clear consumers without racing dispatch.
            match capture_loop.done_rx.recv_timeout(self.join_timeout) {
                Ok(()) => {
                    let _ = capture_loop.handle.join();
                }
                Err(_) => {
                    warn!("Capture loop did not exit in time");
                }
            }
        }

        let mut registry = self.registry.lock();
        registry.consumers.clear();
        registry.failed.clear();
        registry.paused = None;
        debug!("Cleared all audio consumers");

        info!("Audio bus stopped");
    }

    /// Swap the whole active consumer set aside, preserving identity
    pub fn pause(&self) {
        let mut registry = self.registry.lock();
        if registry.paused.is_some() {
            debug!("Bus already paused");
            return;
        }
        let active = std::mem::take(&mut registry.consumers);
        info!("Bus paused - set aside {} consumers", active.len());
        registry.paused = Some(active);
    }

    /// Restore the consumer set stashed by `pause`
    ///
    /// A consumer registered while paused stays; a stashed consumer under the
    /// same name does not overwrite it.
    pub fn resume(&self) {
        let mut registry = self.registry.lock();
        let Some(stashed) = registry.paused.take() else {
            debug!("Bus not paused");
            return;
        };
        for consumer in stashed {
            // A consumer that failed before the pause gets a fresh start
            registry.failed.remove(consumer.name());
            if !registry.consumers.iter().any(|c| c.name() == consumer.name()) {
                registry.consumers.push(consumer);
            }
        }
        info!("Bus resumed - {} consumers active", registry.consumers.len());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.registry.lock().paused.is_some()
    }

    pub fn consumer_count(&self) -> usize {
        self.registry.lock().consumers.len()
    }

    pub fn stats(&self) -> BusStats {
        let registry = self.registry.lock();
        BusStats {
            chunks_captured: self.chunks_captured.load(Ordering::Relaxed),
            delivery_errors: self.delivery_errors.load(Ordering::Relaxed),
            failed_consumers: registry.failed.len(),
            consumer_count: registry.consumers.len(),
            is_running: self.running.load(Ordering::SeqCst),
            is_paused: registry.paused.is_some(),
        }
    }
}

fn capture_loop(
    mut device: Box<dyn CaptureDevice>,
    running: Arc<AtomicBool>,
    registry: Arc<Mutex<ConsumerRegistry>>,
    chunks_captured: Arc<AtomicU64>,
    delivery_errors: Arc<AtomicU64>,
    done_tx: Sender<()>,
) {
    let mut seq: u64 = 0;
    let mut backoff = RETRY_BACKOFF_BASE;

    while running.load(Ordering::SeqCst) {
        let bytes = match device.read_chunk() {
            Ok(bytes) => {
                backoff = RETRY_BACKOFF_BASE;
                bytes
            }
            Err(CaptureError::Transient(e)) => {
                if running.load(Ordering::SeqCst) {
                    debug!("Transient capture error, retrying: {}", e);
                    thread::sleep(backoff);
                    backoff = (backoff * 2).min(RETRY_BACKOFF_MAX);
                }
                continue;
            }
            Err(CaptureError::Fatal(e)) => {
                if running.load(Ordering::SeqCst) {
                    error!("Unrecoverable capture error, stopping loop: {}", e);
                }
                break;
            }
        };

        let chunk = AudioChunk::new(bytes, seq);
        seq += 1;
        chunks_captured.fetch_add(1, Ordering::Relaxed);

        // Snapshot under a short lock, then dispatch without it so a slow
        // consumer never blocks registration or the others
        let (consumers, failed) = {
            let reg = registry.lock();
            if !running.load(Ordering::SeqCst) {
                break;
            }
            (reg.consumers.clone(), reg.failed.clone())
        };

        for consumer in &consumers {
            if !running.load(Ordering::SeqCst) {
                break;
            }
            if failed.contains(consumer.name()) {
                continue;
            }
            if let Err(e) = consumer.deliver(&chunk) {
                if running.load(Ordering::SeqCst) {
                    delivery_errors.fetch_add(1, Ordering::Relaxed);
                    let mut reg = registry.lock();
                    if reg.failed.insert(consumer.name().to_string()) {
                        warn!(
                            "Consumer '{}' failed and will be skipped: {}",
                            consumer.name(),
                            e
                        );
                    }
                }
            }
        }
    }

    device.close();
    info!("Audio capture loop ended");
    let _ = done_tx.send(());
}
