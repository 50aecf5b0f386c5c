// Sortie audio CPAL - AudioEngine branché sur le périphérique par défaut
//
// The stream callback owns the mixer; the main thread talks to it through
// ringbuf channels. Ended sources come back as events and are dispatched
// to their observers by a repeating scheduler task, which also frees what
// the callback retired.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer};

use crate::audio::channels::{
    CommandConsumer, CommandProducer, EventConsumer, EventProducer, GarbageConsumer,
    MixerCommand, MixerEvent, create_command_channel, create_event_channel,
    create_garbage_channel,
};
use crate::audio::engine::{AudioEngine, EndedCallback, SourceId, SourceRequest, VoiceId};
use crate::audio::mixer::{Mixer, MixerStats, SOURCE_CAPACITY, VOICE_CAPACITY, Voice};
use crate::error::{PlayerError, Result};
use crate::sequencer::scheduler::{Scheduler, TaskId};
use crate::sequencer::voicing::Tone;

const COMMAND_CAPACITY: usize = 512;
// Room for every playing source plus every source a full command queue can start
const EVENT_CAPACITY: usize = SOURCE_CAPACITY + COMMAND_CAPACITY;
const GARBAGE_CAPACITY: usize = VOICE_CAPACITY + SOURCE_CAPACITY + COMMAND_CAPACITY;

/// Write one mono value to every channel of an interleaved frame
#[inline]
pub fn write_mono_frame<T>(frame: &mut [T], value: f32)
where
    T: Sample + FromSample<f32>,
{
    let converted: T = Sample::from_sample::<f32>(value);
    for out in frame.iter_mut() {
        *out = converted;
    }
}

/// Report an ended source, counting it when the event ring is full
#[inline]
pub fn report_ended(events: &mut EventProducer, stats: &MixerStats, id: u64) {
    if events.try_push(MixerEvent::SourceEnded(id)).is_err() {
        stats.record_lost_event();
    }
}

/// Audio engine rendering to the default output device
pub struct CpalEngine {
    stream: Stream,
    sample_rate: f32,
    commands: RefCell<CommandProducer>,
    events: RefCell<EventConsumer>,
    garbage: RefCell<GarbageConsumer>,
    stats: Arc<MixerStats>,
    // Last `MixerStats::total` logged
    reported_losses: Cell<u64>,
    observers: RefCell<HashMap<u64, EndedCallback>>,
    next_id: Cell<u64>,
    scheduler: Rc<dyn Scheduler>,
    pump_task: Cell<Option<TaskId>>,
}

impl CpalEngine {
    /// Open the default device. Output starts suspended until `resume`.
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Result<Rc<Self>> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::Device("No audio device found".to_string()))?;

        log::info!(
            "Audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported_config = device
            .default_output_config()
            .map_err(|e| PlayerError::Device(format!("Configuration error: {}", e)))?;
        let sample_format = supported_config.sample_format();
        log::debug!("Audio config: {:?}", supported_config);

        let sample_rate = supported_config.sample_rate().0 as f32;
        let channels = supported_config.channels() as usize;
        let config: StreamConfig = supported_config.into();

        let (command_tx, command_rx) = create_command_channel(COMMAND_CAPACITY);
        let (event_tx, event_rx) = create_event_channel(EVENT_CAPACITY);
        let (garbage_tx, garbage_rx) = create_garbage_channel(GARBAGE_CAPACITY);
        let mixer = Mixer::new(sample_rate, garbage_tx);
        let stats = mixer.stats();

        let stream = match sample_format {
            SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config, channels, mixer, command_rx, event_tx)
            }
            SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config, channels, mixer, command_rx, event_tx)
            }
            SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config, channels, mixer, command_rx, event_tx)
            }
            other => Err(PlayerError::Device(format!(
                "Unsupported sample format: {:?}",
                other
            ))),
        }?;

        // Suspended until the first user interaction
        if let Err(e) = stream.pause() {
            log::warn!("Could not suspend output stream: {}", e);
        }

        let engine = Rc::new(Self {
            stream,
            sample_rate,
            commands: RefCell::new(command_tx),
            events: RefCell::new(event_rx),
            garbage: RefCell::new(garbage_rx),
            stats,
            reported_losses: Cell::new(0),
            observers: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
            scheduler: Rc::clone(&scheduler),
            pump_task: Cell::new(None),
        });

        let weak = Rc::downgrade(&engine);
        let task = scheduler.schedule_repeating(Box::new(move || match weak.upgrade() {
            Some(engine) => {
                engine.pump();
                true
            }
            None => false,
        }));
        engine.pump_task.set(Some(task));

        Ok(engine)
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        channels: usize,
        mut mixer: Mixer,
        mut commands: CommandConsumer,
        mut events: EventProducer,
    ) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let stats = mixer.stats();
        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // No allocations, no frees, no I/O, no locks
                    while let Some(command) = commands.try_pop() {
                        mixer.apply(command, |id| report_ended(&mut events, &stats, id));
                    }

                    for frame in data.chunks_mut(channels) {
                        let value = mixer.next_sample(|id| report_ended(&mut events, &stats, id));
                        write_mono_frame(frame, value);
                    }
                },
                |err| log::error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| PlayerError::Device(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn allocate_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    fn send(&self, command: MixerCommand) -> bool {
        if self.commands.borrow_mut().try_push(command).is_err() {
            log::warn!("Audio command queue full, request dropped");
            return false;
        }
        true
    }

    pub fn stats(&self) -> &MixerStats {
        &self.stats
    }

    /// Free what the callback retired and dispatch sources that ended
    /// since the last call
    pub fn pump(&self) {
        while self.garbage.borrow_mut().try_pop().is_some() {}

        let losses = self.stats.total();
        if losses != self.reported_losses.replace(losses) {
            log::warn!(
                "Audio callback overloaded: {} voices and {} sources refused, \
                 {} end events lost, {} items freed in the callback",
                self.stats.rejected_voices(),
                self.stats.rejected_sources(),
                self.stats.lost_events(),
                self.stats.freed_in_callback()
            );
        }

        loop {
            let event = self.events.borrow_mut().try_pop();
            let Some(MixerEvent::SourceEnded(id)) = event else {
                break;
            };
            // Observers may re-enter the engine
            let observer = self.observers.borrow_mut().remove(&id);
            if let Some(on_ended) = observer {
                on_ended();
            }
        }
    }
}

impl AudioEngine for CpalEngine {
    fn start_tone(&self, tone: &Tone) -> VoiceId {
        let id = self.allocate_id();
        self.send(MixerCommand::StartVoice {
            id,
            voice: Voice::new(tone, self.sample_rate),
        });
        VoiceId(id)
    }

    fn stop_tone(&self, voice: VoiceId) {
        self.send(MixerCommand::StopVoice(voice.0));
    }

    fn start_source(&self, request: SourceRequest, on_ended: EndedCallback) -> SourceId {
        let id = self.allocate_id();
        self.observers.borrow_mut().insert(id, on_ended);
        let sent = self.send(MixerCommand::StartSource {
            id,
            buffer: request.buffer,
            playback_rate: request.playback_rate,
            offset_seconds: request.offset_seconds,
        });
        if !sent {
            self.observers.borrow_mut().remove(&id);
        }
        SourceId(id)
    }

    fn stop_source(&self, source: SourceId) {
        self.observers.borrow_mut().remove(&source.0);
        self.send(MixerCommand::StopSource(source.0));
    }

    fn resume(&self) {
        if let Err(e) = self.stream.play() {
            log::error!("Could not resume output stream: {}", e);
        }
    }
}

impl Drop for CpalEngine {
    fn drop(&mut self) {
        if let Some(task) = self.pump_task.take() {
            self.scheduler.cancel(task);
        }
    }
}
