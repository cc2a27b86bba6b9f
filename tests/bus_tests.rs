//! Broadcast bus integration tests

mod common;

use common::{scripted_device, wait_for};
use hark::audio::{AudioBroadcastBus, AudioChunk, AudioConsumer};
use hark::config::AudioConfig;
use hark::{HarkError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Consumer recording payloads; flips to failing on demand
struct RecordingConsumer {
    name: String,
    chunks: Mutex<Vec<Vec<u8>>>,
    fail: AtomicBool,
}

impl RecordingConsumer {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            chunks: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        })
    }

    fn received(&self) -> Vec<Vec<u8>> {
        self.chunks.lock().clone()
    }
}

impl AudioConsumer for RecordingConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&self, chunk: &AudioChunk) -> Result<()> {
        self.chunks.lock().push(chunk.bytes().to_vec());
        if self.fail.load(Ordering::SeqCst) {
            Err(HarkError::ConsumerError("broken pipe".into()))
        } else {
            Ok(())
        }
    }
}

#[test]
fn test_fault_isolation_and_recovery() {
    let (tx, device) = scripted_device();
    let bus = AudioBroadcastBus::new(AudioConfig::default(), device);

    let a = RecordingConsumer::new("a");
    let b = RecordingConsumer::new("b");
    b.fail.store(true, Ordering::SeqCst);
    bus.add_consumer(a.clone());
    bus.add_consumer(b.clone());
    bus.start().unwrap();

    // B receives X, errors, and is marked failed; A is unaffected
    tx.send(b"X".to_vec()).unwrap();
    assert!(wait_for(|| bus.stats().failed_consumers == 1));
    assert_eq!(a.received(), vec![b"X".to_vec()]);
    assert_eq!(b.received(), vec![b"X".to_vec()]);

    // Y skips B entirely
    tx.send(b"Y".to_vec()).unwrap();
    assert!(wait_for(|| a.received().len() == 2));
    assert_eq!(a.received()[1], b"Y".to_vec());
    assert_eq!(b.received().len(), 1);

    // Re-registering B under the same name clears the failed flag
    b.fail.store(false, Ordering::SeqCst);
    bus.add_consumer(b.clone());
    assert_eq!(bus.stats().failed_consumers, 0);

    tx.send(b"Z".to_vec()).unwrap();
    assert!(wait_for(|| b.received().len() == 2));
    assert_eq!(b.received()[1], b"Z".to_vec());
    assert_eq!(a.received().len(), 3);

    bus.stop();
}

#[test]
fn test_chunks_delivered_in_capture_order() {
    let (tx, device) = scripted_device();
    let bus = AudioBroadcastBus::new(AudioConfig::default(), device);
    let a = RecordingConsumer::new("a");
    bus.add_consumer(a.clone());
    bus.start().unwrap();

    for i in 0..10u8 {
        tx.send(vec![i]).unwrap();
    }
    assert!(wait_for(|| a.received().len() == 10));
    let received = a.received();
    for (i, bytes) in received.iter().enumerate() {
        assert_eq!(bytes, &vec![i as u8]);
    }

    bus.stop();
}

#[test]
fn test_capture_continues_while_paused() {
    let (tx, device) = scripted_device();
    let bus = AudioBroadcastBus::new(AudioConfig::default(), device);
    let a = RecordingConsumer::new("a");
    bus.add_consumer(a.clone());
    bus.start().unwrap();

    bus.pause();
    tx.send(vec![1]).unwrap();
    assert!(wait_for(|| bus.stats().chunks_captured >= 1));
    assert!(a.received().is_empty());

    bus.resume();
    tx.send(vec![2]).unwrap();
    assert!(wait_for(|| a.received().len() == 1));

    bus.stop();
}

#[test]
fn test_stop_clears_consumers_and_restart_needs_new_device() {
    let (tx, device) = scripted_device();
    let bus = AudioBroadcastBus::new(AudioConfig::default(), device);
    let a = RecordingConsumer::new("a");
    bus.add_consumer(a.clone());
    bus.start().unwrap();

    tx.send(vec![0]).unwrap();
    assert!(wait_for(|| a.received().len() == 1));

    bus.stop();
    assert_eq!(bus.consumer_count(), 0);
    assert!(!bus.is_running());

    // The device was consumed by the first run
    assert!(bus.start().is_err());
}
