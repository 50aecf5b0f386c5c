//! Transport behaviour of the player, driven by a virtual clock
//!
//! Every test runs the player against the headless recording engine and an
//! `EventLoop` advanced by hand, so timings are exact.

use std::cell::Cell;
use std::rc::Rc;

use tone_player::{
    AudioBuffer, Contents, EventLoop, LockedAction, NoteSequence, Player, PlayerError,
    PlayerSettings, RecordingEngine, SessionContext, TransportState,
};

const EPSILON: f64 = 1e-9;

struct Harness {
    engine: Rc<RecordingEngine>,
    clock: Rc<EventLoop>,
    session: SessionContext,
    player: Player,
}

fn harness() -> Harness {
    let engine = Rc::new(RecordingEngine::new());
    let clock = Rc::new(EventLoop::new());
    let session = SessionContext::new();
    let player = Player::new(
        engine.clone(),
        clock.clone(),
        &session,
        PlayerSettings::default(),
    );
    Harness {
        engine,
        clock,
        session,
        player,
    }
}

fn notes(values: &[Option<f64>]) -> NoteSequence {
    NoteSequence::new(values.to_vec()).unwrap()
}

fn ten_seconds_of_silence() -> AudioBuffer {
    AudioBuffer::new(vec![0.0; 44100 * 10], 44100, 1)
}

#[test]
fn test_bpm_keeps_derived_fields_consistent() {
    let h = harness();
    for bpm in [1.0, 30.0, 60.0, 97.5, 120.0, 240.0, 1000.0] {
        h.player.set_bpm(bpm).unwrap();
        assert!((h.player.length_scale() - 240.0 / bpm).abs() < EPSILON);
        assert!((h.player.tempo_ms() - h.player.length_scale() * 1000.0).abs() < EPSILON);
    }
}

#[test]
fn test_invalid_bpm_leaves_tempo_untouched() {
    let h = harness();
    h.player.set_bpm(120.0).unwrap();
    for bpm in [0.0, -10.0, f64::NAN, f64::INFINITY] {
        assert!(matches!(
            h.player.set_bpm(bpm),
            Err(PlayerError::InvalidArgument(_))
        ));
    }
    assert_eq!(h.player.bpm(), 120.0);
    assert_eq!(h.player.tempo_ms(), 2000.0);
}

#[test]
fn test_rest_consumes_a_step_silently() {
    let h = harness();
    h.player
        .load_notes(notes(&[Some(4.0), None, Some(0.0), Some(4.0), Some(60.0), Some(0.0)]))
        .unwrap();
    h.player.play().unwrap();

    assert_eq!(h.player.current_note_index(), 3);
    assert!(h.engine.tones().is_empty());
    assert_eq!(h.clock.next_timer_due(), Some(h.player.tempo_ms() / 4.0));

    h.clock.advance_by(1000.0);
    assert_eq!(h.engine.tones().len(), 1);
}

#[test]
fn test_single_note_voicing() {
    let h = harness();
    h.player
        .load_notes(notes(&[Some(4.0), Some(60.0), Some(0.0)]))
        .unwrap();
    h.player.play().unwrap();

    let tones = h.engine.tones();
    assert_eq!(tones.len(), 1);
    let tone = &tones[0];
    assert!((tone.frequency - 261.6255).abs() < 1e-4);
    assert!((tone.duration() - 0.25 * h.player.length_scale()).abs() < EPSILON);

    // Ramp 0 -> peak over the first 20%
    let envelope = tone.envelope;
    assert!((envelope.attack_end() - 0.2).abs() < EPSILON);
    assert_eq!(envelope.gain_at(0.0), 0.0);
    assert!((envelope.gain_at(0.1) - envelope.peak / 2.0).abs() < EPSILON);
    assert_eq!(envelope.peak, 1.0);
}

#[test]
#[rustfmt::skip]
fn test_chord_starts_together() {
    let h = harness();
    h.player
        .load_notes(notes(&[
            Some(4.0), Some(60.0), Some(0.0),
            Some(0.0), Some(64.0), Some(3.0),
            Some(0.0), Some(67.0), Some(5.0),
        ]))
        .unwrap();
    h.player.play().unwrap();

    let tones = h.engine.tones();
    assert_eq!(tones.len(), 3);
    assert!(tones.iter().all(|t| (t.duration() - 1.0).abs() < EPSILON));
    let mut frequencies: Vec<f64> = tones.iter().map(|t| t.frequency).collect();
    frequencies.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert!((frequencies[0] - 261.6255).abs() < 1e-4);
    assert!((frequencies[1] - 261.6255 * 2f64.powf(3.0 / 12.0)).abs() < 1e-4);
    assert!((frequencies[2] - 261.6255 * 2f64.powf(5.0 / 12.0)).abs() < 1e-4);

    assert_eq!(h.player.current_note_index(), 9);
    assert_eq!(h.clock.next_timer_due(), Some(h.player.tempo_ms() / 4.0));
}

#[test]
#[rustfmt::skip]
fn test_steps_follow_their_denominators() {
    let h = harness();
    h.player
        .load_notes(notes(&[
            Some(2.0), Some(60.0), Some(0.0),
            Some(8.0), Some(60.0), Some(2.0),
            Some(8.0), Some(60.0), Some(4.0),
        ]))
        .unwrap();
    h.player.play().unwrap();

    h.clock.advance_by(1999.0);
    assert_eq!(h.engine.tones().len(), 1);
    h.clock.advance_by(1.0);
    assert_eq!(h.engine.tones().len(), 2);
    h.clock.advance_by(500.0);
    assert_eq!(h.engine.tones().len(), 3);
    assert!(h.player.is_locked());
    h.clock.advance_by(500.0);
    assert!(!h.player.is_locked());
    assert_eq!(h.player.current_note_index(), 0);
}

#[test]
fn test_locked_player_rejects_new_payload() {
    let h = harness();
    h.player.load_file(ten_seconds_of_silence()).unwrap();
    h.player.play().unwrap();
    let loaded = h.player.file_buffer().unwrap();

    let err = h
        .player
        .load_notes(notes(&[Some(4.0), Some(1.0), Some(0.0)]))
        .unwrap_err();
    assert!(matches!(err, PlayerError::Locked(LockedAction::LoadNotes)));
    assert_eq!(err.to_string(), "Tried to change notes while locked");

    let err = h.player.load_file(vec![0u8; 16]).unwrap_err();
    assert!(matches!(err, PlayerError::Locked(LockedAction::LoadFile)));

    assert_eq!(h.player.contains(), Contents::File);
    assert!(std::sync::Arc::ptr_eq(&loaded, &h.player.file_buffer().unwrap()));
    assert!(h.player.notes().is_empty());
}

#[test]
fn test_file_plays_at_tempo_rate() {
    let h = harness();
    h.player.set_bpm(90.0).unwrap();
    h.player.load_file(ten_seconds_of_silence()).unwrap();
    h.player.play().unwrap();

    assert_eq!(h.player.state(), TransportState::PlayingFile);
    let sources = h.engine.started_sources();
    assert_eq!(sources.len(), 1);
    assert!((sources[0].1 - 1.5).abs() < EPSILON);
    assert_eq!(sources[0].2, 0.0);
}

#[test]
fn test_file_pause_resume_keeps_position() {
    let h = harness();
    h.player.load_file(ten_seconds_of_silence()).unwrap();
    h.player.play().unwrap();

    h.clock.advance_by(1500.0);
    h.player.pause();
    assert_eq!(h.player.state(), TransportState::Paused);
    assert!(h.engine.active_sources().is_empty());
    assert!((h.player.replay_offset_seconds() - 1.5).abs() < EPSILON);

    h.clock.advance_by(5000.0);
    h.player.resume().unwrap();
    h.clock.advance_by(500.0);
    h.player.pause();
    h.player.resume().unwrap();

    let sources = h.engine.started_sources();
    assert_eq!(sources.len(), 3);
    assert!((sources[1].2 - 1.5).abs() < EPSILON);
    assert!((sources[2].2 - 2.0).abs() < EPSILON);
}

#[test]
fn test_file_completion_finishes_once() {
    let h = harness();
    let ends = Rc::new(Cell::new(0));
    let counter = Rc::clone(&ends);
    h.player.set_on_end(move || counter.set(counter.get() + 1));

    h.player.load_file(ten_seconds_of_silence()).unwrap();
    h.player.play().unwrap();
    h.clock.advance_by(1000.0);
    h.player.pause();
    h.player.resume().unwrap();

    let source = h.player.playing().unwrap();
    assert!(h.engine.complete_source(source));
    assert_eq!(ends.get(), 1);
    assert_eq!(h.player.state(), TransportState::Idle);
    assert_eq!(h.player.replay_offset_seconds(), 0.0);
    // The file stays loaded for another run
    assert_eq!(h.player.contains(), Contents::File);
}

#[test]
fn test_paused_stop_is_not_completion() {
    let h = harness();
    let ended = Rc::new(Cell::new(false));
    let flag = Rc::clone(&ended);
    h.player.set_on_end(move || flag.set(true));

    h.player.load_file(ten_seconds_of_silence()).unwrap();
    h.player.play().unwrap();
    let source = h.player.playing().unwrap();
    h.player.pause();

    assert!(!h.engine.complete_source(source));
    assert!(!ended.get());
    assert!(h.player.is_paused());
}

#[test]
fn test_end_resets_everything() {
    let h = harness();
    h.player
        .load_notes(notes(&[Some(4.0), Some(60.0), Some(0.0), Some(4.0), Some(60.0), Some(2.0)]))
        .unwrap();
    h.player.play().unwrap();
    h.clock.advance_by(1000.0);
    h.player.pause();
    h.player.load_file(ten_seconds_of_silence()).unwrap();
    h.player.play().unwrap();
    h.clock.advance_by(250.0);

    h.player.end();

    assert_eq!(h.player.state(), TransportState::Idle);
    assert_eq!(h.player.contains(), Contents::Empty);
    assert!(h.player.notes().is_empty());
    assert!(h.player.file_buffer().is_none());
    assert!(h.player.playing().is_none());
    assert!(!h.player.is_locked());
    assert!(!h.player.is_paused());
    assert_eq!(h.player.current_note_index(), 0);
    assert_eq!(h.player.replay_offset_seconds(), 0.0);
    assert_eq!(h.clock.pending_timers(), 0);
    assert_eq!(h.clock.active_frame_tasks(), 0);
}

#[test]
fn test_end_while_playing_notes_cancels_timers() {
    let h = harness();
    let ended = Rc::new(Cell::new(false));
    let flag = Rc::clone(&ended);
    h.player.set_on_end(move || flag.set(true));
    h.player
        .load_notes(notes(&[Some(4.0), Some(60.0), Some(0.0)]))
        .unwrap();
    h.player.play().unwrap();
    h.player.end();

    h.clock.advance_by(10_000.0);
    assert!(!ended.get());
    assert_eq!(h.engine.stopped_voices().len(), 1);
}

#[test]
fn test_decode_failure_surfaces_and_keeps_payload() {
    let h = harness();
    let original = notes(&[Some(4.0), Some(60.0), Some(0.0)]);
    h.player.load_notes(original.clone()).unwrap();

    h.engine.fail_decoding("unsupported codec");
    let err = h.player.load_file(vec![1u8, 2, 3]).unwrap_err();
    assert!(matches!(err, PlayerError::Decode(_)));
    assert_eq!(h.player.contains(), Contents::Notes);
    assert_eq!(h.player.notes(), original);
}

#[test]
fn test_garbage_bytes_fail_to_decode() {
    let h = harness();
    let err = h.player.load_file(b"definitely not audio".to_vec()).unwrap_err();
    assert!(matches!(err, PlayerError::Decode(_)));
    assert_eq!(h.player.contains(), Contents::Empty);
}

#[test]
fn test_session_reaches_player_engine() {
    let h = harness();
    assert_eq!(h.session.engine_count(), 1);
    assert!(h.session.notify_first_interaction());
    assert_eq!(h.engine.resume_count(), 1);
}

#[test]
#[rustfmt::skip]
fn test_load_notes_keeps_cursor() {
    let h = harness();
    h.player
        .load_notes(notes(&[
            Some(4.0), Some(60.0), Some(0.0),
            Some(4.0), Some(60.0), Some(2.0),
            Some(4.0), Some(60.0), Some(4.0),
        ]))
        .unwrap();
    h.player.play().unwrap();
    h.clock.advance_by(1000.0);
    h.player.pause();
    assert_eq!(h.player.current_note_index(), 3);

    h.player
        .load_notes(notes(&[
            Some(4.0), Some(60.0), Some(10.0),
            Some(4.0), Some(60.0), Some(11.0),
            Some(4.0), Some(60.0), Some(12.0),
        ]))
        .unwrap();
    assert_eq!(h.player.current_note_index(), 3);

    h.player.resume().unwrap();
    let last = h.engine.tones().pop().unwrap();
    assert!((last.frequency - 261.6255 * 2f64.powf(11.0 / 12.0)).abs() < 1e-4);
    assert_eq!(h.player.current_note_index(), 6);
}

#[test]
#[rustfmt::skip]
fn test_resume_past_end_of_swapped_notes_finishes() {
    let h = harness();
    let ends = Rc::new(Cell::new(0));
    let counter = Rc::clone(&ends);
    h.player.set_on_end(move || counter.set(counter.get() + 1));

    h.player
        .load_notes(notes(&[
            Some(4.0), Some(60.0), Some(0.0),
            Some(4.0), Some(60.0), Some(2.0),
        ]))
        .unwrap();
    h.player.play().unwrap();
    h.clock.advance_by(1000.0);
    h.player.pause();
    assert_eq!(h.player.current_note_index(), 3);

    // Shorter than the kept cursor
    h.player
        .load_notes(notes(&[Some(4.0), Some(60.0), Some(7.0)]))
        .unwrap();
    let tones_before = h.engine.tones().len();
    h.player.resume().unwrap();

    assert_eq!(ends.get(), 1);
    assert!(!h.player.is_locked());
    assert_eq!(h.player.state(), TransportState::Idle);
    assert_eq!(h.player.current_note_index(), 0);
    assert_eq!(h.engine.tones().len(), tones_before);
    assert_eq!(h.clock.pending_timers(), 0);
}

#[test]
#[rustfmt::skip]
fn test_pause_inside_chord_rewinds_to_head() {
    let h = harness();
    h.player
        .load_notes(notes(&[
            Some(4.0), Some(60.0), Some(0.0),
            Some(4.0), Some(60.0), Some(4.0),
            Some(0.0), Some(60.0), Some(7.0),
            Some(4.0), Some(60.0), Some(12.0),
        ]))
        .unwrap();
    h.player.play().unwrap();
    h.clock.advance_by(1000.0);
    assert_eq!(h.player.current_note_index(), 9);
    assert_eq!(h.engine.tones().len(), 3);

    h.clock.advance_by(400.0);
    h.player.pause();
    assert_eq!(h.player.current_note_index(), 3);
    assert_eq!(h.engine.stopped_voices().len(), 2);

    // Both chord notes sound again
    h.player.resume().unwrap();
    assert_eq!(h.player.current_note_index(), 9);
    let tones = h.engine.tones();
    assert_eq!(tones.len(), 5);
    assert_eq!(tones[3].frequency, tones[1].frequency);
    assert_eq!(tones[4].frequency, tones[2].frequency);
}
