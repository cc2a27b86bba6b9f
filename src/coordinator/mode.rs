//! Mode state with compare-and-swap transitions

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Ownership state of the audio pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    /// Continuous transcription owns the audio
    Transcription = 0,

    /// A mode switch is in flight; audio is being buffered
    Transitioning = 1,

    /// A live two-way voice session owns the audio
    Assistant = 2,

    /// Terminal state, reached only via shutdown
    Disconnected = 3,
}

impl Mode {
    fn from_u8(v: u8) -> Mode {
        match v {
            0 => Mode::Transcription,
            1 => Mode::Transitioning,
            2 => Mode::Assistant,
            _ => Mode::Disconnected,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Transcription => "transcription",
            Mode::Transitioning => "transitioning",
            Mode::Assistant => "assistant",
            Mode::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Single-writer mode cell
///
/// All transitions go through `compare_and_swap`, so two racing transitions
/// cannot both claim the `Transitioning` slot.
pub struct ModeCell {
    value: AtomicU8,
}

impl ModeCell {
    pub fn new(mode: Mode) -> Self {
        Self {
            value: AtomicU8::new(mode as u8),
        }
    }

    pub fn get(&self) -> Mode {
        Mode::from_u8(self.value.load(Ordering::SeqCst))
    }

    /// Transition `from -> to` atomically; returns `false` (and changes
    /// nothing) if the current mode is not `from`
    pub fn compare_and_swap(&self, from: Mode, to: Mode) -> bool {
        self.value
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Unconditional write; used only for terminal shutdown
    pub fn force(&self, mode: Mode) {
        self.value.store(mode as u8, Ordering::SeqCst);
    }
}
