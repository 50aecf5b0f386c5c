// Oscillateurs - Formes d'onde des notes jouées

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Points used to find the peak of a periodic wave for normalization
const NORMALIZE_RESOLUTION: usize = 1024;

pub trait Oscillator {
    fn next_sample(&mut self) -> f32;
    fn set_frequency(&mut self, freq: f32);
}

/// Built-in oscillator shapes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// Custom waveform described by its Fourier coefficients
///
/// `real[k]` and `imag[k]` are the cosine and sine terms of harmonic `k`;
/// index 0 (DC) is ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodicWave {
    pub real: Vec<f32>,
    pub imag: Vec<f32>,
}

impl PeriodicWave {
    pub fn new(real: Vec<f32>, imag: Vec<f32>) -> Self {
        Self { real, imag }
    }

    /// Unnormalized value at `phase` in [0, 1)
    fn evaluate(&self, phase: f32) -> f32 {
        let harmonics = self.real.len().max(self.imag.len());
        let mut value = 0.0;
        for k in 1..harmonics {
            let angle = 2.0 * PI * k as f32 * phase;
            let re = self.real.get(k).copied().unwrap_or(0.0);
            let im = self.imag.get(k).copied().unwrap_or(0.0);
            value += re * angle.cos() + im * angle.sin();
        }
        value
    }

    /// Gain bringing the wave's peak to 1.0
    fn normalization(&self) -> f32 {
        let peak = (0..NORMALIZE_RESOLUTION)
            .map(|i| self.evaluate(i as f32 / NORMALIZE_RESOLUTION as f32).abs())
            .fold(0.0f32, f32::max);
        if peak > 0.0 { 1.0 / peak } else { 0.0 }
    }
}

enum Shape {
    Basic(Waveform),
    Custom { wave: PeriodicWave, gain: f32 },
}

pub struct SimpleOscillator {
    shape: Shape,
    phase: f32,
    phase_increment: f32,
    sample_rate: f32,
}

impl SimpleOscillator {
    pub fn new(waveform: Waveform, sample_rate: f32) -> Self {
        Self {
            shape: Shape::Basic(waveform),
            phase: 0.0,
            phase_increment: 0.0,
            sample_rate,
        }
    }

    /// Oscillator playing a custom wave (takes precedence over any basic shape)
    pub fn with_periodic_wave(wave: PeriodicWave, sample_rate: f32) -> Self {
        let gain = wave.normalization();
        Self {
            shape: Shape::Custom { wave, gain },
            phase: 0.0,
            phase_increment: 0.0,
            sample_rate,
        }
    }
}

impl Oscillator for SimpleOscillator {
    fn next_sample(&mut self) -> f32 {
        let sample = match &self.shape {
            Shape::Basic(Waveform::Sine) => (self.phase * 2.0 * PI).sin(),
            Shape::Basic(Waveform::Square) => {
                if self.phase < 0.5 { 1.0 } else { -1.0 }
            }
            Shape::Basic(Waveform::Sawtooth) => (self.phase * 2.0) - 1.0,
            Shape::Basic(Waveform::Triangle) => {
                if self.phase < 0.5 {
                    (self.phase * 4.0) - 1.0
                } else {
                    3.0 - (self.phase * 4.0)
                }
            }
            Shape::Custom { wave, gain } => wave.evaluate(self.phase) * gain,
        };

        self.phase += self.phase_increment;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }

        sample
    }

    fn set_frequency(&mut self, freq: f32) {
        self.phase_increment = freq / self.sample_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 44100.0;
    const EPSILON: f32 = 0.001;

    #[test]
    fn test_oscillator_frequency() {
        let mut osc = SimpleOscillator::new(Waveform::Sine, SAMPLE_RATE);
        osc.set_frequency(261.6255);

        let expected_increment = 261.6255 / SAMPLE_RATE;
        assert!((osc.phase_increment - expected_increment).abs() < EPSILON);
    }

    #[test]
    fn test_sine_starts_at_zero() {
        let mut osc = SimpleOscillator::new(Waveform::Sine, SAMPLE_RATE);
        osc.set_frequency(440.0);

        let first_sample = osc.next_sample();
        assert!(first_sample.abs() < EPSILON, "First sample: {}", first_sample);
    }

    #[test]
    fn test_basic_shapes_in_range() {
        for waveform in [Waveform::Sine, Waveform::Square, Waveform::Sawtooth, Waveform::Triangle] {
            let mut osc = SimpleOscillator::new(waveform, SAMPLE_RATE);
            osc.set_frequency(440.0);
            for _ in 0..1000 {
                let sample = osc.next_sample();
                assert!(
                    (-1.0..=1.0).contains(&sample),
                    "{:?} sample out of range: {}",
                    waveform,
                    sample
                );
            }
        }
    }

    #[test]
    fn test_periodic_wave_is_normalized() {
        // Fundamental plus a strong third harmonic
        let wave = PeriodicWave::new(vec![0.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.5]);
        let mut osc = SimpleOscillator::with_periodic_wave(wave, SAMPLE_RATE);
        osc.set_frequency(100.0);

        let mut peak = 0.0f32;
        for _ in 0..2000 {
            peak = peak.max(osc.next_sample().abs());
        }
        assert!(peak <= 1.0 + EPSILON, "peak {}", peak);
        assert!(peak > 0.9, "peak {}", peak);
    }

    #[test]
    fn test_silent_periodic_wave() {
        let wave = PeriodicWave::new(vec![1.0], vec![0.0]);
        let mut osc = SimpleOscillator::with_periodic_wave(wave, SAMPLE_RATE);
        osc.set_frequency(440.0);
        assert_eq!(osc.next_sample(), 0.0);
    }

    #[test]
    fn test_waveform_names() {
        let json = serde_json::to_string(&Waveform::Sawtooth).unwrap();
        assert_eq!(json, "\"sawtooth\"");
        let parsed: Waveform = serde_json::from_str("\"triangle\"").unwrap();
        assert_eq!(parsed, Waveform::Triangle);
    }
}
