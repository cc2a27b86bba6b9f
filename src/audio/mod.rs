pub mod bus;
pub mod capture;
pub mod chunk;
pub mod transition;

pub use bus::{AudioBroadcastBus, AudioConsumer, BusStats};
#[cfg(feature = "audio-io")]
pub use capture::CpalCapture;
pub use capture::{CaptureDevice, CaptureError};
pub use chunk::AudioChunk;
pub use transition::TransitionBuffer;
