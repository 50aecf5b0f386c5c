// Recording engine - Headless AudioEngine that keeps a log of every request
// Used for offline hosts and tests: nothing is rendered, file completion is triggered by hand

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::audio::buffer::AudioBuffer;
use crate::audio::engine::{AudioEngine, EndedCallback, SourceId, SourceRequest, VoiceId};
use crate::error::{PlayerError, Result};
use crate::sequencer::voicing::Tone;

/// One request received by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ToneStarted { voice: VoiceId, tone: Tone },
    ToneStopped(VoiceId),
    SourceStarted {
        source: SourceId,
        playback_rate: f64,
        offset_seconds: f64,
    },
    SourceStopped(SourceId),
    Resumed,
}

#[derive(Default)]
pub struct RecordingEngine {
    events: RefCell<Vec<EngineEvent>>,
    next_id: Cell<u64>,
    observers: RefCell<HashMap<SourceId, EndedCallback>>,
    decode_failure: RefCell<Option<String>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    /// Everything received so far, in order
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.borrow().clone()
    }

    /// Tones started so far, in order
    pub fn tones(&self) -> Vec<Tone> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                EngineEvent::ToneStarted { tone, .. } => Some(tone.clone()),
                _ => None,
            })
            .collect()
    }

    /// Voices stopped before their natural end
    pub fn stopped_voices(&self) -> Vec<VoiceId> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                EngineEvent::ToneStopped(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// (source, playback rate, offset) of every started source
    pub fn started_sources(&self) -> Vec<(SourceId, f64, f64)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                EngineEvent::SourceStarted {
                    source,
                    playback_rate,
                    offset_seconds,
                } => Some((*source, *playback_rate, *offset_seconds)),
                _ => None,
            })
            .collect()
    }

    /// Sources started and neither stopped nor completed
    pub fn active_sources(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self.observers.borrow().keys().copied().collect();
        ids.sort_by_key(|id| id.0);
        ids
    }

    pub fn resume_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, EngineEvent::Resumed))
            .count()
    }

    /// Make the next `decode` calls fail with this message
    pub fn fail_decoding(&self, message: &str) {
        *self.decode_failure.borrow_mut() = Some(message.to_string());
    }

    /// Simulate a source playing to its end; returns false if it is not active
    pub fn complete_source(&self, source: SourceId) -> bool {
        // Release the borrow before the observer re-enters the engine
        let observer = self.observers.borrow_mut().remove(&source);
        match observer {
            Some(on_ended) => {
                on_ended();
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl AudioEngine for RecordingEngine {
    fn start_tone(&self, tone: &Tone) -> VoiceId {
        let voice = VoiceId(self.allocate_id());
        self.events.borrow_mut().push(EngineEvent::ToneStarted {
            voice,
            tone: tone.clone(),
        });
        voice
    }

    fn stop_tone(&self, voice: VoiceId) {
        self.events.borrow_mut().push(EngineEvent::ToneStopped(voice));
    }

    fn start_source(&self, request: SourceRequest, on_ended: EndedCallback) -> SourceId {
        let source = SourceId(self.allocate_id());
        self.observers.borrow_mut().insert(source, on_ended);
        self.events.borrow_mut().push(EngineEvent::SourceStarted {
            source,
            playback_rate: request.playback_rate,
            offset_seconds: request.offset_seconds,
        });
        source
    }

    fn stop_source(&self, source: SourceId) {
        self.observers.borrow_mut().remove(&source);
        self.events.borrow_mut().push(EngineEvent::SourceStopped(source));
    }

    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer> {
        if let Some(message) = self.decode_failure.borrow().clone() {
            return Err(PlayerError::Decode(message));
        }
        crate::audio::decode::decode_audio(bytes)
    }

    fn resume(&self) {
        self.events.borrow_mut().push(EngineEvent::Resumed);
    }
}
