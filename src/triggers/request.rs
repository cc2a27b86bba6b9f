//! Validation requests, sequence numbers, and the latest-wins mailbox
//!
//! A newer utterance always outranks an older one still awaiting validation.
//! Sequence numbers are strictly increasing for the process lifetime, and the
//! mailbox holds at most one pending request: publishing replaces whatever
//! was waiting.

use crate::triggers::TriggerDefinition;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Process-wide strictly increasing sequence source
#[derive(Default)]
pub struct SequenceCounter {
    value: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next sequence number
    pub fn next(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Most recently issued sequence number
    pub fn latest(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

/// One admitted utterance with its matched candidate triggers
pub struct ValidationRequest {
    pub id: Uuid,
    pub text: String,
    pub candidates: Vec<Arc<TriggerDefinition>>,
    pub seq: u64,
    fired: AtomicBool,
}

impl ValidationRequest {
    pub fn new(text: String, candidates: Vec<Arc<TriggerDefinition>>, seq: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            text,
            candidates,
            seq,
            fired: AtomicBool::new(false),
        }
    }

    /// Claim the single execution slot; only the first caller gets `true`
    pub fn try_fire(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

struct SlotState<T> {
    value: Option<T>,
    closed: bool,
}

/// Single-slot replace-on-write mailbox
///
/// Publishing while a value is still waiting replaces it and hands the stale
/// value back to the publisher. The consumer blocks until a value or close.
pub struct LatestSlot<T> {
    state: Mutex<SlotState<T>>,
    cond: Condvar,
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                value: None,
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Put a value in the slot, returning any unconsumed value it replaced
    pub fn publish(&self, value: T) -> Option<T> {
        let mut state = self.state.lock();
        if state.closed {
            return Some(value);
        }
        let replaced = state.value.replace(value);
        self.cond.notify_one();
        replaced
    }

    /// Block until a value is available or the slot is closed
    pub fn recv(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(value) = state.value.take() {
                return Some(value);
            }
            if state.closed {
                return None;
            }
            self.cond.wait(&mut state);
        }
    }

    /// Close the slot; pending `recv` calls wake with `None` after draining
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.cond.notify_all();
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
