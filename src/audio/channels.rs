// Canaux lock-free entre le thread principal et le callback audio

use std::sync::Arc;

use ringbuf::{HeapRb, traits::Split};

use crate::audio::buffer::AudioBuffer;
use crate::audio::mixer::Voice;

/// Requests sent to the audio callback
///
/// Voices are fully built on the main thread; the callback only moves them in.
pub enum MixerCommand {
    StartVoice { id: u64, voice: Voice },
    StopVoice(u64),
    StartSource {
        id: u64,
        buffer: Arc<AudioBuffer>,
        playback_rate: f64,
        offset_seconds: f64,
    },
    StopSource(u64),
}

/// Things the audio callback is done with, freed on the main thread
pub enum Retired {
    Voice(Voice),
    Buffer(Arc<AudioBuffer>),
}

/// Events reported back by the audio callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixerEvent {
    /// A source played to the end of its buffer
    SourceEnded(u64),
}

pub type CommandProducer = ringbuf::HeapProd<MixerCommand>;
pub type CommandConsumer = ringbuf::HeapCons<MixerCommand>;

pub fn create_command_channel(capacity: usize) -> (CommandProducer, CommandConsumer) {
    let rb = HeapRb::<MixerCommand>::new(capacity);
    rb.split()
}

pub type EventProducer = ringbuf::HeapProd<MixerEvent>;
pub type EventConsumer = ringbuf::HeapCons<MixerEvent>;

pub fn create_event_channel(capacity: usize) -> (EventProducer, EventConsumer) {
    let rb = HeapRb::<MixerEvent>::new(capacity);
    rb.split()
}

pub type GarbageProducer = ringbuf::HeapProd<Retired>;
pub type GarbageConsumer = ringbuf::HeapCons<Retired>;

pub fn create_garbage_channel(capacity: usize) -> (GarbageProducer, GarbageConsumer) {
    let rb = HeapRb::<Retired>::new(capacity);
    rb.split()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::{Consumer, Producer};

    #[test]
    fn test_event_channel_fifo() {
        let (mut tx, mut rx) = create_event_channel(4);
        tx.try_push(MixerEvent::SourceEnded(1)).unwrap();
        tx.try_push(MixerEvent::SourceEnded(2)).unwrap();

        assert_eq!(rx.try_pop(), Some(MixerEvent::SourceEnded(1)));
        assert_eq!(rx.try_pop(), Some(MixerEvent::SourceEnded(2)));
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn test_command_channel_full() {
        let (mut tx, _rx) = create_command_channel(1);
        assert!(tx.try_push(MixerCommand::StopVoice(1)).is_ok());
        assert!(tx.try_push(MixerCommand::StopVoice(2)).is_err());
    }
}
