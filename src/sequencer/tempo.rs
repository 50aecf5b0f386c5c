// Tempo - BPM and the durations derived from it
// A note denominator N lasts (1/N) whole notes; a whole note lasts 240/bpm seconds

use crate::error::{PlayerError, Result};
use std::fmt;

/// Beats per minute used when nothing else is configured
pub const DEFAULT_BPM: f64 = 60.0;

/// Tempo in BPM (Beats Per Minute)
///
/// `length_scale` and `tempo_ms` are derived from `bpm` and are only ever
/// recomputed together, through `set_bpm`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
    length_scale: f64,
    tempo_ms: f64,
}

impl Tempo {
    /// Creates a new tempo, rejecting zero, negative and non-finite BPM
    pub fn new(bpm: f64) -> Result<Self> {
        let mut tempo = Self::default();
        tempo.set_bpm(bpm)?;
        Ok(tempo)
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Set BPM value and recompute the derived durations
    pub fn set_bpm(&mut self, bpm: f64) -> Result<()> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(PlayerError::InvalidArgument(format!(
                "BPM must be a positive number, got {}",
                bpm
            )));
        }
        self.bpm = bpm;
        self.length_scale = 240.0 / bpm;
        self.tempo_ms = self.length_scale * 1000.0;
        Ok(())
    }

    /// Seconds in a whole note (multiply by 1/denominator for a note length)
    pub fn length_scale(&self) -> f64 {
        self.length_scale
    }

    /// Milliseconds in a whole note
    pub fn tempo_ms(&self) -> f64 {
        self.tempo_ms
    }

    /// Delay before the step after a note of this denominator, in milliseconds
    pub fn step_delay_ms(&self, denominator: f64) -> f64 {
        self.tempo_ms / denominator
    }

    /// Sounding length of a note of this denominator, in seconds
    pub fn note_duration_seconds(&self, denominator: f64) -> f64 {
        (1.0 / denominator) * self.length_scale
    }

    /// Playback rate applied to files: 60 BPM plays at normal speed
    pub fn file_playback_rate(&self) -> f64 {
        self.bpm / 60.0
    }
}

impl Default for Tempo {
    fn default() -> Self {
        let length_scale = 240.0 / DEFAULT_BPM;
        Self {
            bpm: DEFAULT_BPM,
            length_scale,
            tempo_ms: length_scale * 1000.0,
        }
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}
