use crate::audio::AudioChunk;
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use std::sync::Arc;

/// Bounded FIFO holding audio captured while a mode switch is in flight
///
/// On overflow the oldest chunk is dropped and the newest kept; a live
/// conversation wants recency, not history. Each buffer is used for exactly
/// one transition and is flushed or discarded once, never both.
pub struct TransitionBuffer {
    inner: Arc<Mutex<HeapRb<AudioChunk>>>,
    overflows: Arc<Mutex<u64>>,
}

impl TransitionBuffer {
    /// Create a new buffer with the specified capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HeapRb::new(capacity))),
            overflows: Arc::new(Mutex::new(0)),
        }
    }

    /// Append a chunk, evicting the oldest on overflow
    pub fn push(&self, chunk: AudioChunk) {
        let mut buffer = self.inner.lock();
        if buffer.try_push(chunk.clone()).is_err() {
            let _ = buffer.try_pop();
            let _ = buffer.try_push(chunk);
            *self.overflows.lock() += 1;
        }
    }

    /// Take every buffered chunk in original capture order, leaving the
    /// buffer empty
    pub fn drain(&self) -> Vec<AudioChunk> {
        let mut buffer = self.inner.lock();
        let mut chunks = Vec::with_capacity(buffer.occupied_len());
        while let Some(chunk) = buffer.try_pop() {
            chunks.push(chunk);
        }
        chunks
    }

    /// Discard all buffered chunks
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity().get()
    }

    /// Number of chunks evicted due to overflow
    pub fn overflows(&self) -> u64 {
        *self.overflows.lock()
    }
}

impl Clone for TransitionBuffer {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            overflows: Arc::clone(&self.overflows),
        }
    }
}
