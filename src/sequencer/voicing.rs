// Voicing - Turns a note of a step into a tone request for the audio engine

use crate::audio::oscillator::{PeriodicWave, Waveform};

/// Middle C in Hz; pitches are semitone offsets from it
pub const MIDDLE_C_HZ: f64 = 261.6255;

/// Portion of the note spent ramping in, and again ramping out
pub const ENVELOPE_RAMP_FRACTION: f64 = 0.2;

/// Equal-temperament frequency of a semitone offset from middle C
pub fn pitch_to_frequency(pitch: f64) -> f64 {
    MIDDLE_C_HZ * 2f64.powf(pitch / 12.0)
}

/// Loudness correction for a pitch
///
/// Low notes are hard to hear and high notes are very loud; this cubic
/// curve boosts the former and attenuates the latter, capped at 1.
pub fn corrected_volume(pitch: f64) -> f64 {
    let volume = ((-pitch + 43.0) / 40.0).powi(3) + 0.1;
    volume.min(1.0)
}

/// Three-stage linear gain envelope: ramp up, hold, ramp down
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub peak: f64,
    pub duration: f64,
}

impl Envelope {
    pub fn new(peak: f64, duration: f64) -> Self {
        Self { peak, duration }
    }

    /// End of the attack ramp, in seconds from note start
    pub fn attack_end(&self) -> f64 {
        self.duration * ENVELOPE_RAMP_FRACTION
    }

    /// Start of the release ramp, in seconds from note start
    pub fn release_start(&self) -> f64 {
        self.duration - self.duration * ENVELOPE_RAMP_FRACTION
    }

    /// Breakpoints (time, gain) joined by straight lines
    pub fn breakpoints(&self) -> [(f64, f64); 4] {
        [
            (0.0, 0.0),
            (self.attack_end(), self.peak),
            (self.release_start(), self.peak),
            (self.duration, 0.0),
        ]
    }

    /// Gain at `t` seconds after the note started
    pub fn gain_at(&self, t: f64) -> f64 {
        if t <= 0.0 || t >= self.duration {
            return 0.0;
        }
        let attack_end = self.attack_end();
        let release_start = self.release_start();
        if t < attack_end {
            self.peak * t / attack_end
        } else if t < release_start {
            self.peak
        } else {
            self.peak * (self.duration - t) / (self.duration - release_start)
        }
    }
}

/// A single oscillator note handed to the audio engine
///
/// The engine stops it on its own once `envelope.duration` has elapsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Tone {
    pub frequency: f64,
    pub waveform: Waveform,
    pub periodic_wave: Option<PeriodicWave>,
    pub envelope: Envelope,
}

impl Tone {
    /// Voice a pitch for `duration` seconds with the corrected volume
    pub fn for_pitch(
        pitch: f64,
        duration: f64,
        waveform: Waveform,
        periodic_wave: Option<PeriodicWave>,
    ) -> Self {
        Self {
            frequency: pitch_to_frequency(pitch),
            waveform,
            periodic_wave,
            envelope: Envelope::new(corrected_volume(pitch), duration),
        }
    }

    pub fn duration(&self) -> f64 {
        self.envelope.duration
    }
}
