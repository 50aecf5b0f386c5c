// Audio engine - What the player needs from the audio backend
//
// The player only decides *what* to play and *when*; generating samples,
// envelopes, compression and device output all live behind this trait.

use std::sync::Arc;

use crate::audio::buffer::AudioBuffer;
use crate::audio::decode::decode_audio;
use crate::error::Result;
use crate::sequencer::voicing::Tone;

/// Handle of a sounding oscillator note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(pub u64);

/// Handle of a playing file source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u64);

/// Callback fired when a file source reaches the end of its buffer
pub type EndedCallback = Box<dyn FnOnce()>;

/// Start request for a file-backed source
#[derive(Debug, Clone)]
pub struct SourceRequest {
    pub buffer: Arc<AudioBuffer>,
    /// 1.0 = normal speed
    pub playback_rate: f64,
    /// Where to start in the buffer, in seconds
    pub offset_seconds: f64,
}

/// Audio backend of one player session
///
/// Each engine owns its own output bus and compressor; every tone and source
/// started on it is mixed through that compressor.
pub trait AudioEngine {
    /// Start an oscillator note; it stops by itself after `tone.duration()`
    fn start_tone(&self, tone: &Tone) -> VoiceId;

    /// Stop a note early. No-op if it already ended.
    fn stop_tone(&self, voice: VoiceId);

    /// Start playing a decoded buffer
    ///
    /// `on_ended` runs on the engine's host thread once the source plays to
    /// the end of the buffer. A source stopped with `stop_source` never
    /// reports.
    fn start_source(&self, request: SourceRequest, on_ended: EndedCallback) -> SourceId;

    /// Stop a source. No-op if it already ended.
    fn stop_source(&self, source: SourceId);

    /// Decode raw file bytes into a playable buffer
    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer> {
        decode_audio(bytes)
    }

    /// Resume output after it was suspended (autoplay policies, device idle)
    fn resume(&self);
}
