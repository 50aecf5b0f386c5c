// Player - Transport state machine for a note sequence or a decoded file
//
// Playback of notes is a chain of one-shot timers: each step schedules the
// next one before sounding, so only one step is ever pending. Files are
// handed to the engine whole, with a per-frame poll watching the session.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::audio::buffer::AudioBuffer;
use crate::audio::engine::{AudioEngine, SourceId, SourceRequest, VoiceId};
use crate::config::PlayerSettings;
use crate::error::{LockedAction, PlayerError, Result};
use crate::sequencer::notes::{NoteSequence, StepKind};
use crate::sequencer::scheduler::{Scheduler, TaskId};
use crate::sequencer::tempo::Tempo;
use crate::sequencer::voicing::Tone;
use crate::session::{SessionContext, SessionId};

/// Which payload is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Contents {
    #[default]
    Empty,
    Notes,
    File,
}

/// Observable transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    PlayingFile,
    PlayingNotes,
    Paused,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::PlayingFile | TransportState::PlayingNotes)
    }
}

/// File payload: raw bytes still to decode, or an already decoded buffer
#[derive(Debug, Clone)]
pub enum FileSource {
    Encoded(Vec<u8>),
    Decoded(Arc<AudioBuffer>),
}

impl From<Vec<u8>> for FileSource {
    fn from(bytes: Vec<u8>) -> Self {
        FileSource::Encoded(bytes)
    }
}

impl From<AudioBuffer> for FileSource {
    fn from(buffer: AudioBuffer) -> Self {
        FileSource::Decoded(Arc::new(buffer))
    }
}

impl From<Arc<AudioBuffer>> for FileSource {
    fn from(buffer: Arc<AudioBuffer>) -> Self {
        FileSource::Decoded(buffer)
    }
}

#[derive(Default)]
struct PlayerState {
    tempo: Tempo,
    contains: Contents,
    notes: NoteSequence,
    file_buffer: Option<Arc<AudioBuffer>>,
    current_note_index: usize,
    // Head of the step sounded last; pause rewinds here
    last_step_start: Option<usize>,
    voices: Vec<VoiceId>,
    playing: Option<SourceId>,
    // Bumped on every file start so stale completions are ignored
    file_run: u64,
    started_at_ms: f64,
    locked: bool,
    paused: bool,
    replay_offset_seconds: f64,
    step_timer: Option<TaskId>,
    finish_timer: Option<TaskId>,
    liveness_poll: Option<TaskId>,
}

struct Shared {
    engine: Rc<dyn AudioEngine>,
    scheduler: Rc<dyn Scheduler>,
    session: SessionContext,
    session_id: SessionId,
    settings: PlayerSettings,
    state: RefCell<PlayerState>,
    on_end: RefCell<Option<Rc<dyn Fn()>>>,
}

/// Audio player handle
///
/// Cloning gives another handle on the same player; scheduled continuations
/// hold a weak reference, so dropping every handle stops the chain.
#[derive(Clone)]
pub struct Player {
    shared: Rc<Shared>,
}

impl Player {
    /// Create a player bound to the live session of `session`
    pub fn new(
        engine: Rc<dyn AudioEngine>,
        scheduler: Rc<dyn Scheduler>,
        session: &SessionContext,
        settings: PlayerSettings,
    ) -> Self {
        session.register_engine(&engine);
        let session_id = session.current_id();
        log::debug!("Player created in {}", session_id);

        Self {
            shared: Rc::new(Shared {
                engine,
                scheduler,
                session: session.clone(),
                session_id,
                settings,
                state: RefCell::new(PlayerState::default()),
                on_end: RefCell::new(None),
            }),
        }
    }

    fn from_weak(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    fn downgrade(&self) -> Weak<Shared> {
        Rc::downgrade(&self.shared)
    }

    // ========== Tempo ==========

    pub fn bpm(&self) -> f64 {
        self.shared.state.borrow().tempo.bpm()
    }

    /// Change the tempo; also changes the speed of files started afterwards
    pub fn set_bpm(&self, bpm: f64) -> Result<()> {
        self.shared.state.borrow_mut().tempo.set_bpm(bpm)
    }

    pub fn length_scale(&self) -> f64 {
        self.shared.state.borrow().tempo.length_scale()
    }

    pub fn tempo_ms(&self) -> f64 {
        self.shared.state.borrow().tempo.tempo_ms()
    }

    // ========== Loading ==========

    /// Replace the note sequence
    ///
    /// The note cursor is kept as is, so swapping notes between a pause
    /// and a resume continues from the same position in the new list.
    /// When the new list is shorter than that position, the next `play` or
    /// `resume` completes at once: playback finishes and `on_end` fires.
    pub fn load_notes(&self, notes: NoteSequence) -> Result<()> {
        let mut state = self.shared.state.borrow_mut();
        if state.locked {
            return Err(PlayerError::Locked(LockedAction::LoadNotes));
        }
        state.contains = Contents::Notes;
        state.notes = notes;
        Ok(())
    }

    /// Load a file, decoding it first if needed
    pub fn load_file(&self, file: impl Into<FileSource>) -> Result<()> {
        if self.shared.state.borrow().locked {
            return Err(PlayerError::Locked(LockedAction::LoadFile));
        }

        let buffer = match file.into() {
            FileSource::Encoded(bytes) => Arc::new(self.shared.engine.decode(&bytes)?),
            FileSource::Decoded(buffer) => buffer,
        };

        let mut state = self.shared.state.borrow_mut();
        // Decoding happens outside the borrow; re-check in case playback started
        if state.locked {
            return Err(PlayerError::Locked(LockedAction::LoadFile));
        }
        log::debug!("Loaded file ({:.2}s)", buffer.duration_seconds());
        state.contains = Contents::File;
        state.file_buffer = Some(buffer);
        Ok(())
    }

    // ========== Transport ==========

    /// Start playback from the current position
    pub fn play(&self) -> Result<()> {
        self.play_from(0.0)
    }

    /// Start playback; files start `offset_seconds` into the buffer
    pub fn play_from(&self, offset_seconds: f64) -> Result<()> {
        {
            let mut state = self.shared.state.borrow_mut();
            if state.locked {
                return Err(PlayerError::Locked(LockedAction::Play));
            }
            state.paused = false;
        }
        log::info!("Play");
        self.advance(offset_seconds);
        Ok(())
    }

    /// Continue after `pause`, from where it stopped
    pub fn resume(&self) -> Result<()> {
        let offset = {
            let mut state = self.shared.state.borrow_mut();
            if state.locked {
                return Err(PlayerError::Locked(LockedAction::Play));
            }
            state.paused = false;
            state.replay_offset_seconds
        };
        log::info!("Resume");
        self.advance(offset);
        Ok(())
    }

    /// Stop sounding and unlock, keeping the position
    pub fn pause(&self) {
        let shared = &self.shared;
        let mut state = shared.state.borrow_mut();
        state.paused = true;

        if state.contains == Contents::File {
            if let Some(source) = state.playing.take() {
                let elapsed_ms = shared.scheduler.now_ms() - state.started_at_ms;
                state.replay_offset_seconds += elapsed_ms / 1000.0;
                shared.engine.stop_source(source);
            }
        } else {
            if let Some(start) = state.last_step_start.take() {
                state.current_note_index = start;
            }
            for voice in state.voices.drain(..) {
                shared.engine.stop_tone(voice);
            }
            if let Some(timer) = state.step_timer.take() {
                shared.scheduler.cancel(timer);
            }
            if let Some(timer) = state.finish_timer.take() {
                shared.scheduler.cancel(timer);
            }
        }

        state.locked = false;
    }

    /// Stop and unload everything
    pub fn end(&self) {
        self.pause();

        let shared = &self.shared;
        let mut state = shared.state.borrow_mut();
        state.notes = NoteSequence::default();
        state.file_buffer = None;
        state.contains = Contents::Empty;
        state.playing = None;
        state.paused = false;
        state.replay_offset_seconds = 0.0;
        state.step_timer = None;
        state.current_note_index = 0;
        state.last_step_start = None;
        if let Some(poll) = state.liveness_poll.take() {
            shared.scheduler.cancel(poll);
        }
        log::info!("End");
    }

    /// Callback run each time playback completes on its own
    pub fn set_on_end(&self, callback: impl Fn() + 'static) {
        *self.shared.on_end.borrow_mut() = Some(Rc::new(callback));
    }

    pub fn clear_on_end(&self) {
        *self.shared.on_end.borrow_mut() = None;
    }

    // ========== Inspection ==========

    pub fn state(&self) -> TransportState {
        let state = self.shared.state.borrow();
        if state.locked {
            match state.contains {
                Contents::File => TransportState::PlayingFile,
                _ => TransportState::PlayingNotes,
            }
        } else if state.paused {
            TransportState::Paused
        } else {
            TransportState::Idle
        }
    }

    pub fn contains(&self) -> Contents {
        self.shared.state.borrow().contains
    }

    pub fn notes(&self) -> NoteSequence {
        self.shared.state.borrow().notes.clone()
    }

    pub fn file_buffer(&self) -> Option<Arc<AudioBuffer>> {
        self.shared.state.borrow().file_buffer.clone()
    }

    pub fn current_note_index(&self) -> usize {
        self.shared.state.borrow().current_note_index
    }

    pub fn is_locked(&self) -> bool {
        self.shared.state.borrow().locked
    }

    pub fn is_paused(&self) -> bool {
        self.shared.state.borrow().paused
    }

    /// Source currently playing, in file mode
    pub fn playing(&self) -> Option<SourceId> {
        self.shared.state.borrow().playing
    }

    pub fn replay_offset_seconds(&self) -> f64 {
        self.shared.state.borrow().replay_offset_seconds
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.shared.settings
    }

    pub fn session_id(&self) -> SessionId {
        self.shared.session_id
    }

    /// True once a newer session has started
    pub fn is_stale(&self) -> bool {
        self.shared.session.current_id() != self.shared.session_id
    }

    // ========== Internals ==========

    /// Drive playback one step; bypasses the lock so the step chain can run
    fn advance(&self, offset_seconds: f64) {
        let contains = self.shared.state.borrow().contains;
        match contains {
            Contents::File => self.start_file(offset_seconds),
            Contents::Notes | Contents::Empty => self.play_step(),
        }
    }

    fn start_file(&self, offset_seconds: f64) {
        let shared = &self.shared;
        let mut state = shared.state.borrow_mut();
        let Some(buffer) = state.file_buffer.clone() else {
            return;
        };

        state.locked = true;
        state.started_at_ms = shared.scheduler.now_ms();
        state.file_run += 1;
        let run = state.file_run;

        let request = SourceRequest {
            buffer,
            playback_rate: state.tempo.file_playback_rate(),
            offset_seconds,
        };
        let weak = self.downgrade();
        let source = shared.engine.start_source(
            request,
            Box::new(move || {
                if let Some(player) = Player::from_weak(&weak) {
                    player.on_source_ended(run);
                }
            }),
        );
        state.playing = Some(source);
        log::debug!("File source {:?} started at {:.3}s", source, offset_seconds);

        if state.liveness_poll.is_none() {
            let weak = self.downgrade();
            let poll = shared.scheduler.schedule_repeating(Box::new(move || {
                match Player::from_weak(&weak) {
                    Some(player) => player.check_liveness(),
                    None => false,
                }
            }));
            state.liveness_poll = Some(poll);
        }
    }

    fn on_source_ended(&self, run: u64) {
        let finished = {
            let mut state = self.shared.state.borrow_mut();
            let current = state.file_run == run && state.playing.is_some();
            if current && !state.paused {
                state.playing = None;
                true
            } else {
                false
            }
        };
        if finished {
            self.finish();
        }
    }

    /// Liveness poll tick; returns whether to keep polling
    fn check_liveness(&self) -> bool {
        if !self.is_stale() {
            return true;
        }
        log::warn!(
            "{} superseded by {}, tearing player down",
            self.shared.session_id,
            self.shared.session.current_id()
        );
        self.shared.state.borrow_mut().liveness_poll = None;
        self.end();
        false
    }

    fn play_step(&self) {
        let shared = &self.shared;
        let mut state = shared.state.borrow_mut();
        if state.notes.is_empty() {
            return;
        }
        let Some(step) = state.notes.step_at(state.current_note_index) else {
            // Cursor left past the end by a shorter sequence
            drop(state);
            self.finish();
            return;
        };
        state.locked = true;

        let delay_ms = state.tempo.step_delay_ms(step.denominator);
        let weak = self.downgrade();
        // The last step hands over to `finish` instead of another step
        if step.end() >= state.notes.len() {
            let finish = shared.scheduler.schedule_once(
                delay_ms,
                Box::new(move || {
                    if let Some(player) = Player::from_weak(&weak) {
                        player.finish();
                    }
                }),
            );
            state.finish_timer = Some(finish);
        } else {
            let next = shared.scheduler.schedule_once(
                delay_ms,
                Box::new(move || {
                    if let Some(player) = Player::from_weak(&weak) {
                        player.advance(0.0);
                    }
                }),
            );
            state.step_timer = Some(next);
        }
        state.last_step_start = Some(step.start);

        match &step.kind {
            StepKind::Rest => {
                log::debug!("Step {}: rest, next in {:.1}ms", step.start, delay_ms);
            }
            StepKind::Notes(pitches) => {
                let duration = state.tempo.note_duration_seconds(step.denominator);
                state.voices.clear();
                for &pitch in pitches.iter().rev() {
                    let tone = Tone::for_pitch(
                        pitch,
                        duration,
                        shared.settings.instrument,
                        shared.settings.waveform.clone(),
                    );
                    let voice = shared.engine.start_tone(&tone);
                    state.voices.push(voice);
                }
                log::debug!(
                    "Step {}: {} note(s) for {:.3}s, next in {:.1}ms",
                    step.start,
                    pitches.len(),
                    duration,
                    delay_ms
                );
            }
        }
        state.current_note_index = step.end();
    }

    /// Natural end of playback
    fn finish(&self) {
        self.pause();
        {
            let mut state = self.shared.state.borrow_mut();
            state.locked = false;
            state.playing = None;
            state.paused = false;
            state.replay_offset_seconds = 0.0;
            state.step_timer = None;
            state.current_note_index = 0;
            state.last_step_start = None;
        }
        log::info!("Playback finished");

        let callback = self.shared.on_end.borrow().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}
