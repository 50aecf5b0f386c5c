// Mixer - Voix oscillateur et lecture de buffers, mixées dans le callback audio
//
// Runs entirely on the audio thread: no locks, no I/O. Vectors are
// preallocated and never grow; whatever the mixer lets go of is handed to
// the garbage channel so the deallocation happens on the main thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ringbuf::traits::Producer;

use crate::audio::buffer::AudioBuffer;
use crate::audio::channels::{GarbageProducer, MixerCommand, Retired};
use crate::audio::dynamics::{
    CompressorParams, DynamicsCompressor, flush_denormals_to_zero, soft_clip,
};
use crate::audio::oscillator::{Oscillator, SimpleOscillator};
use crate::sequencer::voicing::{Envelope, Tone};

pub const VOICE_CAPACITY: usize = 64;
pub const SOURCE_CAPACITY: usize = 8;

/// One sounding note: oscillator shaped by its envelope
pub struct Voice {
    oscillator: SimpleOscillator,
    envelope: Envelope,
    elapsed: f64,
    sample_period: f64,
}

impl Voice {
    pub fn new(tone: &Tone, sample_rate: f32) -> Self {
        let mut oscillator = match &tone.periodic_wave {
            Some(wave) => SimpleOscillator::with_periodic_wave(wave.clone(), sample_rate),
            None => SimpleOscillator::new(tone.waveform, sample_rate),
        };
        oscillator.set_frequency(tone.frequency as f32);

        Self {
            oscillator,
            envelope: tone.envelope,
            elapsed: 0.0,
            sample_period: 1.0 / sample_rate as f64,
        }
    }

    #[inline]
    fn next_sample(&mut self) -> f32 {
        let gain = self.envelope.gain_at(self.elapsed) as f32;
        self.elapsed += self.sample_period;
        self.oscillator.next_sample() * gain
    }

    #[inline]
    fn is_finished(&self) -> bool {
        self.elapsed >= self.envelope.duration
    }
}

/// A buffer being read at some playback rate
struct SourcePlayback {
    id: u64,
    buffer: Arc<AudioBuffer>,
    // Position in buffer frames
    position: f64,
    step: f64,
}

impl SourcePlayback {
    fn new(
        id: u64,
        buffer: Arc<AudioBuffer>,
        playback_rate: f64,
        offset_seconds: f64,
        output_rate: f32,
    ) -> Self {
        let buffer_rate = buffer.sample_rate() as f64;
        Self {
            id,
            position: offset_seconds.max(0.0) * buffer_rate,
            step: playback_rate.max(0.0) * buffer_rate / output_rate as f64,
            buffer,
        }
    }

    #[inline]
    fn next_sample(&mut self) -> f32 {
        let sample = self.buffer.sample_at(self.position);
        self.position += self.step;
        sample
    }

    #[inline]
    fn is_finished(&self) -> bool {
        self.position >= self.buffer.frames() as f64
    }
}

/// Counters written by the audio thread, read by the main thread
#[derive(Debug, Default)]
pub struct MixerStats {
    rejected_voices: AtomicU64,
    rejected_sources: AtomicU64,
    lost_events: AtomicU64,
    // Retired items the garbage channel had no room for
    freed_in_callback: AtomicU64,
}

impl MixerStats {
    pub fn rejected_voices(&self) -> u64 {
        self.rejected_voices.load(Ordering::Relaxed)
    }

    pub fn rejected_sources(&self) -> u64 {
        self.rejected_sources.load(Ordering::Relaxed)
    }

    pub fn lost_events(&self) -> u64 {
        self.lost_events.load(Ordering::Relaxed)
    }

    pub fn freed_in_callback(&self) -> u64 {
        self.freed_in_callback.load(Ordering::Relaxed)
    }

    pub fn record_lost_event(&self) {
        self.lost_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Sum of every counter, to notice a change cheaply
    pub fn total(&self) -> u64 {
        self.rejected_voices()
            + self.rejected_sources()
            + self.lost_events()
            + self.freed_in_callback()
    }
}

/// Everything one engine is playing, summed through its compressor
pub struct Mixer {
    voices: Vec<(u64, Voice)>,
    sources: Vec<SourcePlayback>,
    compressor: DynamicsCompressor,
    sample_rate: f32,
    garbage: GarbageProducer,
    stats: Arc<MixerStats>,
}

impl Mixer {
    pub fn new(sample_rate: f32, garbage: GarbageProducer) -> Self {
        Self {
            voices: Vec::with_capacity(VOICE_CAPACITY),
            sources: Vec::with_capacity(SOURCE_CAPACITY),
            compressor: DynamicsCompressor::new(CompressorParams::default(), sample_rate),
            sample_rate,
            garbage,
            stats: Arc::new(MixerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<MixerStats> {
        Arc::clone(&self.stats)
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn active_sources(&self) -> usize {
        self.sources.len()
    }

    #[inline]
    fn retire(&mut self, item: Retired) {
        if self.garbage.try_push(item).is_err() {
            self.stats.freed_in_callback.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Apply one request; a source refused for lack of room is reported
    /// through `on_ended` right away
    pub fn apply(&mut self, command: MixerCommand, mut on_ended: impl FnMut(u64)) {
        match command {
            MixerCommand::StartVoice { id, voice } => {
                if self.voices.len() < VOICE_CAPACITY {
                    self.voices.push((id, voice));
                } else {
                    self.stats.rejected_voices.fetch_add(1, Ordering::Relaxed);
                    self.retire(Retired::Voice(voice));
                }
            }
            MixerCommand::StopVoice(id) => {
                if let Some(i) = self.voices.iter().position(|(v, _)| *v == id) {
                    let (_, voice) = self.voices.swap_remove(i);
                    self.retire(Retired::Voice(voice));
                }
            }
            MixerCommand::StartSource {
                id,
                buffer,
                playback_rate,
                offset_seconds,
            } => {
                if self.sources.len() < SOURCE_CAPACITY {
                    let source = SourcePlayback::new(
                        id,
                        buffer,
                        playback_rate,
                        offset_seconds,
                        self.sample_rate,
                    );
                    self.sources.push(source);
                } else {
                    self.stats.rejected_sources.fetch_add(1, Ordering::Relaxed);
                    self.retire(Retired::Buffer(buffer));
                    on_ended(id);
                }
            }
            MixerCommand::StopSource(id) => {
                if let Some(i) = self.sources.iter().position(|s| s.id == id) {
                    let source = self.sources.swap_remove(i);
                    self.retire(Retired::Buffer(source.buffer));
                }
            }
        }
    }

    /// Next mono output sample; `on_ended` receives each source that ran out
    #[inline]
    pub fn next_sample(&mut self, mut on_ended: impl FnMut(u64)) -> f32 {
        let mut sum = 0.0;

        let mut i = 0;
        while i < self.voices.len() {
            sum += self.voices[i].1.next_sample();
            if self.voices[i].1.is_finished() {
                let (_, voice) = self.voices.swap_remove(i);
                self.retire(Retired::Voice(voice));
            } else {
                i += 1;
            }
        }

        let mut i = 0;
        while i < self.sources.len() {
            if self.sources[i].is_finished() {
                let source = self.sources.swap_remove(i);
                on_ended(source.id);
                self.retire(Retired::Buffer(source.buffer));
                continue;
            }
            sum += self.sources[i].next_sample();
            i += 1;
        }

        let sample = flush_denormals_to_zero(self.compressor.process(sum));
        soft_clip(sample)
    }
}
