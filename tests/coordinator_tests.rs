//! Mode coordinator integration tests

mod common;

use common::{fast_transition_config, scripted_device, wait_for, FakeSession, FakeTranscriber};
use crossbeam_channel::bounded;
use hark::audio::AudioBroadcastBus;
use hark::collaborators::SessionCollaborator;
use hark::config::AudioConfig;
use hark::coordinator::{Mode, ModeCoordinator};
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct Harness {
    tx: crossbeam_channel::Sender<Vec<u8>>,
    bus: Arc<AudioBroadcastBus>,
    transcriber: Arc<FakeTranscriber>,
    session: Arc<FakeSession>,
    coordinator: Arc<ModeCoordinator>,
}

fn harness() -> Harness {
    harness_with_context(|| "earlier conversation".to_string())
}

fn harness_with_context(context: impl Fn() -> String + Send + Sync + 'static) -> Harness {
    let (tx, device) = scripted_device();
    let bus = Arc::new(AudioBroadcastBus::new(AudioConfig::default(), device));
    let transcriber = Arc::new(FakeTranscriber::default());
    let session = Arc::new(FakeSession::default());
    let coordinator = Arc::new(ModeCoordinator::new(
        Arc::clone(&bus),
        transcriber.clone(),
        session.clone(),
        Box::new(context),
        fast_transition_config(),
    ));
    Harness {
        tx,
        bus,
        transcriber,
        session,
        coordinator,
    }
}

#[test]
fn test_start_attaches_transcription_consumer() {
    let h = harness();
    h.bus.start().unwrap();
    h.coordinator.start().unwrap();

    assert!(h.transcriber.state.lock().connected);
    assert_eq!(h.coordinator.mode(), Mode::Transcription);

    h.tx.send(vec![1]).unwrap();
    assert!(wait_for(|| !h.transcriber.state.lock().audio_seqs.is_empty()));

    h.coordinator.shutdown();
    h.bus.stop();
}

#[test]
fn test_successful_assistant_transition() {
    let h = harness();
    h.bus.start().unwrap();
    h.coordinator.start().unwrap();

    let modes = Arc::new(Mutex::new(Vec::new()));
    {
        let modes = Arc::clone(&modes);
        h.coordinator.on_mode_change(move |m| modes.lock().push(m));
    }

    assert!(h.coordinator.start_assistant_mode());
    assert_eq!(h.coordinator.mode(), Mode::Assistant);
    assert!(h.transcriber.state.lock().paused);
    assert_eq!(
        h.session.context.lock().as_deref(),
        Some("earlier conversation")
    );
    assert_eq!(modes.lock().clone(), vec![Mode::Transitioning, Mode::Assistant]);

    // Live audio now flows to the session, not the transcriber
    let before = h.transcriber.state.lock().audio_seqs.len();
    h.tx.send(vec![7]).unwrap();
    assert!(wait_for(|| !h.session.audio_seqs.lock().is_empty()));
    assert_eq!(h.transcriber.state.lock().audio_seqs.len(), before);

    h.coordinator.shutdown();
    h.bus.stop();
}

#[test]
fn test_transition_audio_buffered_and_flushed_in_order() {
    let h = harness();
    h.bus.start().unwrap();
    h.coordinator.start().unwrap();

    // Hold session.start open while audio arrives mid-transition
    let (gate_tx, gate_rx) = bounded::<()>(1);
    *h.session.gate.lock() = Some(gate_rx);

    let coordinator = Arc::clone(&h.coordinator);
    let switch = thread::spawn(move || coordinator.start_assistant_mode());

    assert!(wait_for(|| h.session.start_calls.load(Ordering::SeqCst) == 1));
    for i in 0..5u8 {
        h.tx.send(vec![i]).unwrap();
    }
    // Let the bus deliver into the transition buffer before releasing
    thread::sleep(Duration::from_millis(100));
    gate_tx.send(()).unwrap();

    assert!(switch.join().unwrap());
    assert!(wait_for(|| h.session.audio_seqs.lock().len() >= 5));

    // Buffered chunks were flushed before any live chunk, capture order intact
    let seqs = h.session.audio_seqs.lock().clone();
    for pair in seqs.windows(2) {
        assert!(pair[0] < pair[1], "out of order: {:?}", seqs);
    }

    h.coordinator.shutdown();
    h.bus.stop();
}

#[test]
fn test_declined_session_rolls_back() {
    let h = harness();
    h.bus.start().unwrap();
    h.coordinator.start().unwrap();
    h.session.accept.store(false, Ordering::SeqCst);

    assert!(!h.coordinator.start_assistant_mode());
    assert_eq!(h.coordinator.mode(), Mode::Transcription);
    assert!(!h.transcriber.state.lock().paused);
    assert_eq!(h.transcriber.state.lock().resume_calls, 1);
    assert!(h.session.audio_seqs.lock().is_empty());
    assert_eq!(h.coordinator.stats().rollbacks, 1);

    // Transcription consumer was re-attached
    let before = h.transcriber.state.lock().audio_seqs.len();
    h.tx.send(vec![9]).unwrap();
    assert!(wait_for(|| h.transcriber.state.lock().audio_seqs.len() > before));

    // A rollback leaves the coordinator able to try again
    h.session.accept.store(true, Ordering::SeqCst);
    assert!(h.coordinator.start_assistant_mode());
    assert_eq!(h.coordinator.mode(), Mode::Assistant);

    h.coordinator.shutdown();
    h.bus.stop();
}

#[test]
fn test_duplicate_and_invalid_transitions_rejected() {
    let h = harness();
    h.bus.start().unwrap();
    h.coordinator.start().unwrap();

    // Not in assistant mode yet
    assert!(!h.coordinator.end_assistant_mode());

    assert!(h.coordinator.start_assistant_mode());
    // Second start is rejected without touching the session again
    assert!(!h.coordinator.start_assistant_mode());
    assert_eq!(h.session.start_calls.load(Ordering::SeqCst), 1);

    h.coordinator.shutdown();
    h.bus.stop();
}

#[test]
fn test_end_assistant_returns_to_transcription() {
    let h = harness();
    h.bus.start().unwrap();
    h.coordinator.start().unwrap();

    assert!(h.coordinator.start_assistant_mode());
    assert!(h.coordinator.end_assistant_mode());

    assert_eq!(h.coordinator.mode(), Mode::Transcription);
    assert!(!h.session.is_active());
    assert!(!h.transcriber.state.lock().paused);

    let before = h.transcriber.state.lock().audio_seqs.len();
    h.tx.send(vec![3]).unwrap();
    assert!(wait_for(|| h.transcriber.state.lock().audio_seqs.len() > before));

    let stats = h.coordinator.stats();
    assert_eq!(stats.mode_changes, 2);
    assert_eq!(stats.rollbacks, 0);

    h.coordinator.shutdown();
    h.bus.stop();
}

#[test]
fn test_history_records_transitions() {
    let h = harness();
    h.bus.start().unwrap();
    h.coordinator.start().unwrap();

    h.coordinator.start_assistant_mode();
    h.coordinator.end_assistant_mode();

    let history = h.coordinator.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].from, Mode::Transcription);
    assert_eq!(history[0].to, Mode::Assistant);
    assert_eq!(history[1].from, Mode::Assistant);
    assert_eq!(history[1].to, Mode::Transcription);

    h.coordinator.shutdown();
    h.bus.stop();
}

#[test]
fn test_shutdown_ends_session_and_disconnects() {
    let h = harness();
    h.bus.start().unwrap();
    h.coordinator.start().unwrap();

    assert!(h.coordinator.start_assistant_mode());
    h.coordinator.shutdown();

    assert_eq!(h.coordinator.mode(), Mode::Disconnected);
    assert!(!h.session.is_active());
    assert_eq!(h.transcriber.state.lock().stop_calls, 1);

    // Disconnected is terminal
    assert!(!h.coordinator.start_assistant_mode());

    h.bus.stop();
}
