//! Rolling transcript context window
//!
//! Holds recent sanitized transcripts so validation sees conversational
//! context, not just the matching utterance. Entries age out lazily.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

struct Entry {
    text: String,
    at: Instant,
}

/// Thread-safe time-windowed transcript buffer
pub struct ContextWindow {
    entries: Mutex<VecDeque<Entry>>,
    max_age: Duration,
}

impl ContextWindow {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_age,
        }
    }

    pub fn push(&self, text: impl Into<String>) {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        Self::evict(&mut entries, now, self.max_age);
        entries.push_back(Entry {
            text: text.into(),
            at: now,
        });
    }

    /// Join all entries still inside the window, oldest first
    pub fn context(&self) -> String {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        Self::evict(&mut entries, now, self.max_age);
        entries
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock();
        Self::evict(&mut entries, Instant::now(), self.max_age);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn evict(entries: &mut VecDeque<Entry>, now: Instant, max_age: Duration) {
        while let Some(front) = entries.front() {
            if now.duration_since(front.at) > max_age {
                entries.pop_front();
            } else {
                break;
            }
        }
    }
}
