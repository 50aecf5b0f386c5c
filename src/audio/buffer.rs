// Decoded audio ready for playback

/// Interleaved f32 PCM held in memory
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Wrap interleaved samples. `channels` must be at least 1.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (one sample per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Length in seconds at normal speed
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Mono value of a frame (channels averaged), 0 past the end
    #[inline]
    pub fn frame_mono(&self, frame: usize) -> f32 {
        let channels = self.channels as usize;
        let start = frame * channels;
        match self.samples.get(start..start + channels) {
            Some(values) => values.iter().sum::<f32>() / channels as f32,
            None => 0.0,
        }
    }

    /// Linear interpolation between frames at a fractional position
    #[inline]
    pub fn sample_at(&self, position: f64) -> f32 {
        if position < 0.0 {
            return 0.0;
        }
        let index = position.floor() as usize;
        let frac = (position - index as f64) as f32;
        let a = self.frame_mono(index);
        let b = self.frame_mono(index + 1);
        a + (b - a) * frac
    }
}
