//! Integration tests for the `AffectStateMachine`.
//!
//! The machine is driven synchronously: fake devices push events into the
//! input channel, the test pumps them into `handle_input`, and a
//! `ManualClock` stands in for wall time so cooldown boundaries can be hit
//! to the millisecond.
//!
//! # What is tested
//!
//! - Connection transitions open and close exactly one session of each kind
//! - `user_listening` follows the last volume sample with no lag
//! - `agent_talking` holds for the cooldown window and drops at its end
//! - Late events from closed sessions never change state
//! - Capture and recognition failure semantics
//! - Edit-context reconnect policies
//! - The end-to-end conversation scenario

mod support;

use std::sync::Arc;
use std::time::Duration;

use aura_core::{
    ConnectionState, EditReconnectPolicy, Emotion, PresenceSettings, RecognitionStatus,
};
use aura_presence::gate::evaluate;
use aura_presence::{
    AffectStateMachine, CaptureEvent, Clock, MAX_QUICK_RECOGNITION_RESTARTS,
    MIN_RECOGNITION_LIFETIME, ManualClock, ModelTurn, PresenceError, PresenceInput, RemoteEvent,
    SessionEvent, TurnPart,
};
use support::{Fakes, RecognizerMode};
use tokio::sync::mpsc;

// ── Harness ────────────────────────────────────────────────────────

struct Harness {
    machine: AffectStateMachine,
    inputs: mpsc::UnboundedReceiver<PresenceInput>,
    clock: Arc<ManualClock>,
    fakes: Fakes,
}

impl Harness {
    fn new() -> Self {
        Self::with(PresenceSettings::default(), RecognizerMode::Working)
    }

    fn with(settings: PresenceSettings, mode: RecognizerMode) -> Self {
        let fakes = Fakes::new(mode);
        let clock = Arc::new(ManualClock::new());
        let (tx, inputs) = mpsc::unbounded_channel();
        let machine = AffectStateMachine::new(
            fakes.components(settings, Arc::clone(&clock) as Arc<dyn Clock>),
            &tx,
        )
        .expect("valid settings");
        Self {
            machine,
            inputs,
            clock,
            fakes,
        }
    }

    /// Apply everything the fakes have queued.
    fn pump(&mut self) {
        while let Ok(input) = self.inputs.try_recv() {
            self.machine.handle_input(input);
        }
    }

    fn mic_volume(&mut self, level: f32) {
        self.fakes.microphone.emit(&[level; 160]);
        self.pump();
    }

    fn transcript(&mut self, text: &str) {
        self.fakes.recognizer.say(text);
        self.pump();
    }

    fn remote(&mut self, event: RemoteEvent) {
        self.machine.handle_input(PresenceInput::Remote(event));
    }

    fn content(&mut self, text: &str) {
        self.remote(RemoteEvent::Content(ModelTurn {
            parts: vec![TurnPart::text(text)],
        }));
    }

    fn advance_ms(&self, ms: u64) {
        self.clock.advance(Duration::from_millis(ms));
    }
}

fn capture_volume(session: aura_presence::SessionId, level: f32) -> PresenceInput {
    PresenceInput::Capture(SessionEvent {
        session,
        event: CaptureEvent::Volume(level),
    })
}

// ── Connection lifecycle ───────────────────────────────────────────

#[test]
fn starts_disconnected_with_neutral_state() {
    let h = Harness::new();
    let snapshot = h.machine.snapshot();

    assert_eq!(snapshot.connection, ConnectionState::Disconnected);
    assert!(!snapshot.affect.agent_talking);
    assert!(!snapshot.affect.user_listening);
    assert_eq!(snapshot.display_emotion(), Emotion::Neutral);
    assert_eq!(snapshot.recognition, RecognitionStatus::Off);
    assert_eq!(h.fakes.microphone.opens(), 0);
}

#[test]
fn connect_opens_capture_and_recognition() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();

    assert_eq!(h.machine.connection_state(), ConnectionState::ConnectedActive);
    assert!(h.machine.capture_session().is_some());
    assert!(h.machine.transcription_session().is_some());
    assert_eq!(h.fakes.microphone.live_streams(), 1);
    assert_eq!(h.fakes.recognizer.live_sessions(), 1);
    assert_eq!(h.fakes.recognizer.language().as_deref(), Some("en-US"));
    assert_eq!(h.machine.snapshot().recognition, RecognitionStatus::Listening);
}

#[test]
fn connect_twice_is_idempotent() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();
    let first = h.machine.snapshot();
    let capture = h.machine.capture_session();

    h.machine.connect().unwrap();

    assert_eq!(h.machine.snapshot(), first);
    assert_eq!(h.machine.capture_session(), capture);
    assert_eq!(h.fakes.microphone.opens(), 1);
    assert_eq!(h.fakes.recognizer.starts(), 1);
}

#[test]
fn disconnect_releases_everything() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();
    h.mic_volume(0.3);
    h.transcript("this is awful");
    h.remote(RemoteEvent::OutputVolume(0.9));

    h.machine.disconnect();
    h.machine.disconnect();

    let snapshot = h.machine.snapshot();
    assert_eq!(snapshot.connection, ConnectionState::Disconnected);
    assert!(!snapshot.affect.agent_talking);
    assert!(!snapshot.affect.user_listening);
    assert_eq!(snapshot.affect.user_emotion, Emotion::Neutral);
    assert!(snapshot.user_volume.abs() < f32::EPSILON);
    assert_eq!(h.fakes.microphone.live_streams(), 0);
    assert_eq!(h.fakes.recognizer.live_sessions(), 0);
    assert_eq!(h.machine.next_deadline(), None);
}

#[test]
fn disconnect_keeps_agent_emotion() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();
    h.content("What a wonderful, lovely day");
    assert_eq!(h.machine.affect().agent_emotion, Emotion::Happy);

    h.machine.disconnect();
    assert_eq!(h.machine.affect().agent_emotion, Emotion::Happy);
}

#[test]
fn mute_closes_sessions_and_clears_user_side() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();
    h.mic_volume(0.4);
    h.transcript("I am so happy today");
    h.content("I'm glad to hear that");
    h.remote(RemoteEvent::OutputVolume(0.8));

    h.machine.mute();

    let affect = h.machine.affect();
    assert_eq!(h.machine.connection_state(), ConnectionState::ConnectedMuted);
    assert!(!affect.user_listening);
    assert_eq!(affect.user_emotion, Emotion::Neutral);
    assert!(affect.agent_talking);
    assert_eq!(affect.agent_emotion, Emotion::Happy);
    assert_eq!(h.fakes.microphone.live_streams(), 0);
    assert_eq!(h.fakes.recognizer.live_sessions(), 0);

    // Device callbacks racing the mute change nothing.
    h.mic_volume(0.9);
    assert!(!h.machine.affect().user_listening);
}

#[test]
fn unmute_reopens_fresh_sessions() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();
    let before = h.machine.capture_session();

    h.machine.mute();
    h.machine.unmute().unwrap();
    h.machine.unmute().unwrap();

    assert_eq!(h.machine.connection_state(), ConnectionState::ConnectedActive);
    assert_ne!(h.machine.capture_session(), before);
    assert_eq!(h.fakes.microphone.opens(), 2);
    assert_eq!(h.fakes.microphone.live_streams(), 1);
    assert_eq!(h.fakes.recognizer.live_sessions(), 1);
}

#[test]
fn mute_before_connect_opens_nothing() {
    let mut h = Harness::new();
    h.machine.mute();
    assert_eq!(h.machine.connection_state(), ConnectionState::Disconnected);

    h.machine.connect().unwrap();
    assert_eq!(h.machine.connection_state(), ConnectionState::ConnectedMuted);
    assert_eq!(h.fakes.microphone.opens(), 0);

    h.machine.unmute().unwrap();
    assert_eq!(h.fakes.microphone.live_streams(), 1);
}

// ── Volume and cooldown ────────────────────────────────────────────

#[test]
fn user_listening_tracks_last_sample() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();
    let session = h.machine.capture_session().unwrap();
    let threshold = h.machine.settings().listening_threshold;

    for level in [0.2, 0.005, 0.01, 0.011, 0.0, 0.7, 0.009] {
        h.machine.handle_input(capture_volume(session, level));
        assert_eq!(
            h.machine.affect().user_listening,
            evaluate(level, threshold),
            "level {level}"
        );
    }
}

#[test]
fn device_volume_drives_user_listening() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();

    h.mic_volume(0.2);
    assert!(h.machine.affect().user_listening);
    assert!((h.machine.snapshot().user_volume - 0.2).abs() < 1e-4);

    h.mic_volume(0.0);
    assert!(!h.machine.affect().user_listening);
}

#[test]
fn agent_talking_holds_for_cooldown_window() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();

    h.remote(RemoteEvent::OutputVolume(0.8));
    assert!(h.machine.affect().agent_talking);

    h.remote(RemoteEvent::OutputVolume(0.0));
    h.advance_ms(1999);
    assert!(h.machine.affect().agent_talking);
    assert!(!h.machine.expire_cooldowns());

    h.advance_ms(1);
    assert!(!h.machine.affect().agent_talking);
    assert!(h.machine.expire_cooldowns());

    h.advance_ms(1);
    assert!(!h.machine.affect().agent_talking);
    assert!(!h.machine.expire_cooldowns());
}

#[test]
fn agent_talking_false_just_after_window() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();

    h.remote(RemoteEvent::OutputVolume(0.8));
    h.advance_ms(2001);
    assert!(!h.machine.affect().agent_talking);
}

#[test]
fn qualifying_samples_restart_the_window() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();

    h.remote(RemoteEvent::OutputVolume(0.8));
    h.advance_ms(1500);
    h.remote(RemoteEvent::OutputVolume(0.6));
    h.advance_ms(1500);
    assert!(h.machine.affect().agent_talking);

    h.advance_ms(499);
    assert!(h.machine.affect().agent_talking);
    h.advance_ms(1);
    assert!(!h.machine.affect().agent_talking);
}

#[test]
fn output_at_threshold_does_not_arm() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();

    h.remote(RemoteEvent::OutputVolume(0.05));
    assert!(!h.machine.affect().agent_talking);
    assert_eq!(h.machine.next_deadline(), None);
}

#[test]
fn custom_cooldown_is_respected() {
    let settings = PresenceSettings {
        talking_cooldown_ms: 500,
        ..PresenceSettings::default()
    };
    let mut h = Harness::with(settings, RecognizerMode::Working);
    h.machine.connect().unwrap();

    h.remote(RemoteEvent::OutputVolume(0.8));
    h.advance_ms(499);
    assert!(h.machine.affect().agent_talking);
    h.advance_ms(1);
    assert!(!h.machine.affect().agent_talking);
}

// ── Late events ────────────────────────────────────────────────────

#[test]
fn late_capture_event_after_disconnect_is_ignored() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();
    let stale = h.machine.capture_session().unwrap();
    h.machine.disconnect();
    let before = h.machine.snapshot();

    h.machine.handle_input(capture_volume(stale, 0.9));

    assert_eq!(h.machine.snapshot(), before);
}

#[test]
fn device_callback_after_stop_delivers_nothing() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();
    h.machine.disconnect();

    h.fakes.microphone.emit(&[0.9; 4096]);
    h.fakes.recognizer.say("this is terrible");

    assert!(h.inputs.try_recv().is_err());
    assert!(h.fakes.remote.chunks().is_empty());
}

#[test]
fn events_from_previous_session_ignored_after_reconnect() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();
    let stale_capture = h.machine.capture_session().unwrap();
    let stale_transcript = h.machine.transcription_session().unwrap();
    h.machine.disconnect();
    h.machine.connect().unwrap();

    h.machine.handle_input(capture_volume(stale_capture, 0.9));
    h.machine
        .handle_input(PresenceInput::Transcript(SessionEvent {
            session: stale_transcript,
            event: aura_presence::RecognitionEvent::Result {
                text: "this is terrible and awful".to_string(),
                is_final: true,
            },
        }));

    let affect = h.machine.affect();
    assert!(!affect.user_listening);
    assert_eq!(affect.user_emotion, Emotion::Neutral);
}

#[test]
fn queued_events_from_closed_session_are_dropped() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();

    // Queued before the stop, applied after it.
    h.fakes.microphone.emit(&[0.5; 160]);
    h.machine.disconnect();
    h.pump();

    assert!(!h.machine.affect().user_listening);
}

#[test]
fn remote_media_ignored_while_disconnected() {
    let mut h = Harness::new();
    h.content("I love this, wonderful!");
    h.remote(RemoteEvent::OutputVolume(0.9));

    let affect = h.machine.affect();
    assert_eq!(affect.agent_emotion, Emotion::Neutral);
    assert!(!affect.agent_talking);
}

// ── Failures ───────────────────────────────────────────────────────

#[test]
fn capture_failure_forces_disconnect() {
    let mut h = Harness::new();
    h.fakes.microphone.fail_next_open(true);

    let err = h.machine.connect().unwrap_err();

    assert!(matches!(err, PresenceError::DeviceUnavailable(_)));
    let snapshot = h.machine.snapshot();
    assert_eq!(snapshot.connection, ConnectionState::Disconnected);
    assert!(snapshot.capture_error.is_some());
    assert_eq!(h.fakes.recognizer.starts(), 0);
    assert_eq!(h.fakes.recognizer.live_sessions(), 0);
    assert!(h.machine.capture_session().is_none());
}

#[test]
fn capture_failure_on_unmute_forces_disconnect() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();
    h.machine.mute();
    h.fakes.microphone.fail_next_open(true);

    assert!(h.machine.unmute().is_err());
    assert_eq!(h.machine.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn successful_connect_clears_capture_error() {
    let mut h = Harness::new();
    h.fakes.microphone.fail_next_open(true);
    let _ = h.machine.connect();
    h.fakes.microphone.fail_next_open(false);

    h.machine.connect().unwrap();
    assert_eq!(h.machine.snapshot().capture_error, None);
}

#[test]
fn unsupported_recognition_degrades_silently() {
    let mut h = Harness::with(PresenceSettings::default(), RecognizerMode::Unsupported);
    h.machine.connect().unwrap();

    assert_eq!(h.machine.connection_state(), ConnectionState::ConnectedActive);
    assert_eq!(h.machine.snapshot().recognition, RecognitionStatus::Degraded);
    assert!(h.machine.transcription_session().is_none());

    h.mic_volume(0.3);
    assert!(h.machine.affect().user_listening);
}

#[test]
fn broken_recognizer_does_not_abort_connection() {
    let mut h = Harness::with(PresenceSettings::default(), RecognizerMode::Broken);
    h.machine.connect().unwrap();

    assert_eq!(h.machine.connection_state(), ConnectionState::ConnectedActive);
    assert_eq!(h.machine.snapshot().recognition, RecognitionStatus::Degraded);
    assert_eq!(h.fakes.microphone.live_streams(), 1);
}

// ── Transcription ──────────────────────────────────────────────────

#[test]
fn recognition_end_resets_emotion_and_restarts() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();
    let first = h.machine.transcription_session();
    h.transcript("this is terrible and awful");
    assert_eq!(h.machine.affect().user_emotion, Emotion::Sad);

    h.fakes.recognizer.end();
    h.pump();

    assert_eq!(h.machine.affect().user_emotion, Emotion::Neutral);
    assert_eq!(h.fakes.recognizer.starts(), 2);
    assert_eq!(h.fakes.recognizer.live_sessions(), 1);
    assert_ne!(h.machine.transcription_session(), first);
    assert_eq!(h.machine.snapshot().recognition, RecognitionStatus::Listening);
}

#[test]
fn recognition_end_without_restart_turns_recognition_off() {
    let settings = PresenceSettings {
        restart_recognition_on_end: false,
        ..PresenceSettings::default()
    };
    let mut h = Harness::with(settings, RecognizerMode::Working);
    h.machine.connect().unwrap();

    h.fakes.recognizer.end();
    h.pump();

    assert_eq!(h.fakes.recognizer.starts(), 1);
    assert_eq!(h.fakes.recognizer.live_sessions(), 0);
    assert_eq!(h.machine.snapshot().recognition, RecognitionStatus::Off);
    assert_eq!(h.machine.connection_state(), ConnectionState::ConnectedActive);
}

#[test]
fn recognition_that_ends_at_once_is_not_restarted_forever() {
    let mut h = Harness::with(PresenceSettings::default(), RecognizerMode::EndsImmediately);
    h.machine.connect().unwrap();

    h.pump();

    assert!(h.inputs.try_recv().is_err());
    let restarts = usize::try_from(MAX_QUICK_RECOGNITION_RESTARTS).unwrap();
    assert_eq!(h.fakes.recognizer.starts(), 1 + restarts);
    assert_eq!(h.fakes.recognizer.live_sessions(), 0);
    assert_eq!(h.machine.snapshot().recognition, RecognitionStatus::Degraded);
    assert_eq!(h.machine.connection_state(), ConnectionState::ConnectedActive);
}

#[test]
fn long_lived_recognition_is_always_restarted() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();

    for _ in 0..10 {
        h.clock.advance(MIN_RECOGNITION_LIFETIME * 5);
        h.fakes.recognizer.end();
        h.pump();
    }

    assert_eq!(h.fakes.recognizer.starts(), 11);
    assert_eq!(h.machine.snapshot().recognition, RecognitionStatus::Listening);
}

#[test]
fn unmute_retries_recognition_after_giving_up() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();
    for _ in 0..=MAX_QUICK_RECOGNITION_RESTARTS {
        h.fakes.recognizer.end();
        h.pump();
    }
    let given_up_at = h.fakes.recognizer.starts();
    assert_eq!(h.machine.snapshot().recognition, RecognitionStatus::Degraded);
    assert_eq!(h.fakes.recognizer.live_sessions(), 0);

    h.machine.mute();
    h.machine.unmute().unwrap();

    assert_eq!(h.fakes.recognizer.starts(), given_up_at + 1);
    assert_eq!(h.machine.snapshot().recognition, RecognitionStatus::Listening);

    // The quick-end budget starts over.
    h.fakes.recognizer.end();
    h.pump();
    assert_eq!(h.fakes.recognizer.starts(), given_up_at + 2);
}

#[test]
fn chunks_are_forwarded_in_order() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();

    // Default chunks are 128 ms = 2048 samples at 16 kHz.
    h.fakes.microphone.emit(&[0.1; 3000]);
    h.fakes.microphone.emit(&[0.1; 1500]);
    h.pump();

    let chunks = h.fakes.remote.chunks();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].seq, 0);
    assert_eq!(chunks[1].seq, 1);
    assert_eq!(chunks[0].mime_type, "audio/pcm;rate=16000");
    assert_eq!(chunks[0].data.len(), 4096);
}

// ── Remote connection signals ──────────────────────────────────────

#[test]
fn remote_open_and_close_drive_connection() {
    let mut h = Harness::new();

    h.remote(RemoteEvent::Opened);
    assert_eq!(h.machine.connection_state(), ConnectionState::ConnectedActive);

    h.remote(RemoteEvent::Closed {
        reason: Some("server going away".to_string()),
    });
    assert_eq!(h.machine.connection_state(), ConnectionState::Disconnected);
    assert_eq!(h.fakes.microphone.live_streams(), 0);
}

#[test]
fn audio_only_content_keeps_agent_emotion() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();
    h.content("This is terrible and awful");

    h.remote(RemoteEvent::Content(ModelTurn {
        parts: vec![TurnPart::audio("audio/pcm;rate=24000", vec![0; 32])],
    }));

    assert_eq!(h.machine.affect().agent_emotion, Emotion::Sad);
}

// ── Edit context ───────────────────────────────────────────────────

#[test]
fn edit_context_disconnects_and_waits_for_user() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();

    h.machine.enter_edit_context();
    assert_eq!(h.machine.connection_state(), ConnectionState::Disconnected);

    h.machine.leave_edit_context().unwrap();
    assert_eq!(h.machine.connection_state(), ConnectionState::Disconnected);
    assert_eq!(h.fakes.microphone.opens(), 1);
}

#[test]
fn edit_context_restore_policy_reconnects() {
    let settings = PresenceSettings {
        edit_reconnect: EditReconnectPolicy::Restore,
        ..PresenceSettings::default()
    };
    let mut h = Harness::with(settings, RecognizerMode::Working);
    h.machine.connect().unwrap();

    h.machine.enter_edit_context();
    h.machine.leave_edit_context().unwrap();

    assert_eq!(h.machine.connection_state(), ConnectionState::ConnectedActive);
    assert_eq!(h.fakes.microphone.live_streams(), 1);
}

#[test]
fn edit_context_restore_policy_stays_disconnected_if_it_was() {
    let settings = PresenceSettings {
        edit_reconnect: EditReconnectPolicy::Restore,
        ..PresenceSettings::default()
    };
    let mut h = Harness::with(settings, RecognizerMode::Working);

    h.machine.enter_edit_context();
    h.machine.leave_edit_context().unwrap();

    assert_eq!(h.machine.connection_state(), ConnectionState::Disconnected);
    assert_eq!(h.fakes.microphone.opens(), 0);
}

// ── Scenario ───────────────────────────────────────────────────────

#[test]
fn conversation_scenario() {
    let mut h = Harness::new();

    h.machine.connect().unwrap();

    h.mic_volume(0.2);
    assert!(h.machine.affect().user_listening);

    h.transcript("I am so happy today");
    assert_eq!(h.machine.affect().user_emotion, Emotion::Happy);

    h.remote(RemoteEvent::OutputVolume(0.8));
    assert!(h.machine.affect().agent_talking);

    h.content("I'm glad to hear that");
    assert_eq!(h.machine.affect().agent_emotion, Emotion::Happy);
    assert_eq!(h.machine.snapshot().display_emotion(), Emotion::Happy);

    h.remote(RemoteEvent::TurnComplete);
    let affect = h.machine.affect();
    assert_eq!(affect.agent_emotion, Emotion::Neutral);
    assert!(affect.agent_talking);

    h.advance_ms(2000);
    assert!(!h.machine.affect().agent_talking);
    assert_eq!(h.machine.snapshot().display_emotion(), Emotion::Happy);

    h.machine.disconnect();
    let affect = h.machine.affect();
    assert!(!affect.agent_talking);
    assert!(!affect.user_listening);
    assert_eq!(affect.user_emotion, Emotion::Neutral);
    assert_eq!(affect.agent_emotion, Emotion::Neutral);
}

#[test]
fn display_emotion_prefers_talking_agent() {
    let mut h = Harness::new();
    h.machine.connect().unwrap();
    h.transcript("This is terrible and awful");
    h.content("I love this, wonderful!");

    assert_eq!(h.machine.snapshot().display_emotion(), Emotion::Sad);

    h.remote(RemoteEvent::OutputVolume(0.5));
    assert_eq!(h.machine.snapshot().display_emotion(), Emotion::Happy);
}
