//! Capture device abstraction
//!
//! The bus reads fixed-size PCM chunks from a `CaptureDevice`; the cpal-backed
//! implementation bridges the stream callback into a bounded channel so the
//! capture loop can pull chunks at its own pace.

use crate::config::AudioConfig;
use crate::{HarkError, Result};
use std::time::Duration;
use thiserror::Error;

/// Read failure from a capture device
///
/// Transient errors are retried with backoff by the capture loop; fatal
/// errors end it.
#[derive(Error, Debug, Clone)]
pub enum CaptureError {
    #[error("transient capture error: {0}")]
    Transient(String),

    #[error("fatal capture error: {0}")]
    Fatal(String),
}

/// A source of fixed-format PCM chunks
pub trait CaptureDevice: Send {
    /// Open the device at the given fixed format
    fn open(&mut self, config: &AudioConfig) -> Result<()>;

    /// Read one chunk, blocking briefly if none is ready yet
    fn read_chunk(&mut self) -> std::result::Result<Vec<u8>, CaptureError>;

    /// Release the device; safe to call when not open
    fn close(&mut self);
}

#[cfg(feature = "audio-io")]
pub use cpal_impl::CpalCapture;

#[cfg(feature = "audio-io")]
mod cpal_impl {
    use super::*;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
    use tracing::{error, info, warn};

    const CHUNK_QUEUE_DEPTH: usize = 32;
    const READ_TIMEOUT: Duration = Duration::from_millis(500);

    /// Default-input-device capture via cpal
    ///
    /// The cpal stream is `!Send`, so it lives on a dedicated thread spawned
    /// by `open`; this handle only holds channels and stays movable into the
    /// bus's capture loop.
    pub struct CpalCapture {
        chunk_rx: Option<Receiver<Vec<u8>>>,
        stop_tx: Option<Sender<()>>,
    }

    impl CpalCapture {
        pub fn new() -> Self {
            Self {
                chunk_rx: None,
                stop_tx: None,
            }
        }
    }

    impl Default for CpalCapture {
        fn default() -> Self {
            Self::new()
        }
    }

    impl CaptureDevice for CpalCapture {
        fn open(&mut self, config: &AudioConfig) -> Result<()> {
            if self.chunk_rx.is_some() {
                warn!("Capture device already open");
                return Ok(());
            }

            let (chunk_tx, chunk_rx) = bounded::<Vec<u8>>(CHUNK_QUEUE_DEPTH);
            let (stop_tx, stop_rx) = bounded::<()>(1);
            let (ready_tx, ready_rx) = bounded::<Result<()>>(1);

            let samples_per_chunk = config.chunk_size * config.channels as usize;
            let stream_config = cpal::StreamConfig {
                channels: config.channels,
                sample_rate: cpal::SampleRate(config.sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            std::thread::Builder::new()
                .name("cpal-capture".into())
                .spawn(move || {
                    let host = cpal::default_host();
                    let device = match host.default_input_device() {
                        Some(d) => d,
                        None => {
                            let _ = ready_tx.send(Err(HarkError::AudioDeviceError(
                                "No input device available".into(),
                            )));
                            return;
                        }
                    };
                    info!(
                        "Using input device: {}",
                        device.name().unwrap_or_else(|_| "Unknown".to_string())
                    );

                    let err_fn = |err| {
                        error!("Audio input stream error: {}", err);
                    };

                    let mut pending: Vec<u8> = Vec::with_capacity(samples_per_chunk * 2);
                    let stream = device.build_input_stream(
                        &stream_config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            for &sample in data {
                                let s = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                                pending.extend_from_slice(&s.to_le_bytes());
                            }
                            while pending.len() >= samples_per_chunk * 2 {
                                let chunk: Vec<u8> =
                                    pending.drain(..samples_per_chunk * 2).collect();
                                // Drop on backpressure rather than blocking the
                                // audio callback
                                let _ = chunk_tx.try_send(chunk);
                            }
                        },
                        err_fn,
                        None,
                    );

                    let stream = match stream {
                        Ok(s) => s,
                        Err(e) => {
                            let _ = ready_tx.send(Err(HarkError::AudioDeviceError(format!(
                                "Failed to build input stream: {}",
                                e
                            ))));
                            return;
                        }
                    };

                    if let Err(e) = stream.play() {
                        let _ = ready_tx.send(Err(HarkError::AudioDeviceError(format!(
                            "Failed to start input stream: {}",
                            e
                        ))));
                        return;
                    }

                    let _ = ready_tx.send(Ok(()));

                    // Hold the stream alive until close() signals or the
                    // handle is dropped
                    let _ = stop_rx.recv();
                    drop(stream);
                    info!("Capture stream released");
                })
                .map_err(|e| HarkError::AudioDeviceError(format!("Failed to spawn capture thread: {}", e)))?;

            ready_rx
                .recv_timeout(Duration::from_secs(5))
                .map_err(|_| HarkError::AudioDeviceError("Capture thread did not start".into()))??;

            self.chunk_rx = Some(chunk_rx);
            self.stop_tx = Some(stop_tx);
            Ok(())
        }

        fn read_chunk(&mut self) -> std::result::Result<Vec<u8>, CaptureError> {
            let rx = self
                .chunk_rx
                .as_ref()
                .ok_or_else(|| CaptureError::Fatal("device not open".into()))?;

            match rx.recv_timeout(READ_TIMEOUT) {
                Ok(chunk) => Ok(chunk),
                Err(RecvTimeoutError::Timeout) => {
                    Err(CaptureError::Transient("no audio data ready".into()))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    Err(CaptureError::Fatal("capture stream ended".into()))
                }
            }
        }

        fn close(&mut self) {
            if let Some(stop_tx) = self.stop_tx.take() {
                let _ = stop_tx.send(());
            }
            self.chunk_rx = None;
        }
    }

    impl Drop for CpalCapture {
        fn drop(&mut self) {
            self.close();
        }
    }
}
