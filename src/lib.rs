// Tone Player - Library exports for the demo binary and tests

pub mod audio;
pub mod config;
pub mod error;
pub mod sequencer;
pub mod session;

// Re-export commonly used types for convenience
pub use audio::buffer::AudioBuffer;
pub use audio::engine::{AudioEngine, SourceId, SourceRequest, VoiceId};
pub use audio::oscillator::{PeriodicWave, Waveform};
pub use audio::output::CpalEngine;
pub use audio::recorder::{EngineEvent, RecordingEngine};
pub use config::{PlayerSettings, Song};
pub use error::{LockedAction, PlayerError, Result};
pub use sequencer::{
    Contents, EventLoop, FileSource, NoteSequence, Player, Scheduler, Tempo, Tone, TransportState,
};
pub use session::{SessionContext, SessionId};
