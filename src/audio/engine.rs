use super::midi_to_freq;
use super::patch::SynthPatch;
use super::voice::Voice;
use crate::playback::{AudioTimeline, EngineError, ScheduleEntry, REFERENCE_BPM};
use arc_swap::ArcSwap;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tracing::{info, warn};

const COMMAND_CAPACITY: usize = 32;

/// One note registered with the transport, expressed in transport beats so
/// the callback's beat cursor decides when it fires.
#[derive(Debug, Clone)]
struct FiringNote {
    beat: f64,
    duration_beats: f64,
    freq: f32,
    velocity: f32,
}

enum TimelineCommand {
    /// Install a fresh schedule, anchored at the transport's current beat.
    Replace(Vec<FiringNote>),
    /// Drop pending firings and silence every voice.
    Silence,
}

struct EngineShared {
    samples_elapsed: AtomicU64,
    /// f64 BPM bit pattern.
    tempo_bits: AtomicU64,
}

/// cpal-backed audio engine: a schedulable beat-domain timeline plus a
/// monotonic clock. The output stream is opened lazily on the first
/// `start()`, which is where platforms without a usable device refuse.
pub struct AudioEngine {
    shared: Arc<EngineShared>,
    patch: Arc<ArcSwap<SynthPatch>>,
    commands: Option<HeapProd<TimelineCommand>>,
    stream: Option<cpal::Stream>,
    sample_rate: f64,
}

impl AudioEngine {
    pub fn new(patch: SynthPatch) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                samples_elapsed: AtomicU64::new(0),
                tempo_bits: AtomicU64::new(REFERENCE_BPM.to_bits()),
            }),
            patch: Arc::new(ArcSwap::from_pointee(patch)),
            commands: None,
            stream: None,
            sample_rate: 0.0,
        }
    }

    /// Swap the patch heard by the audio callback.
    pub fn set_patch(&self, patch: SynthPatch) {
        self.patch.store(Arc::new(patch));
    }

    pub fn patch(&self) -> SynthPatch {
        SynthPatch::clone(&self.patch.load())
    }

    fn open_stream(&mut self) -> Result<(), EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(EngineError::NoOutputDevice)?;
        let config = device
            .default_output_config()
            .map_err(|e| EngineError::Stream(e.to_string()))?;
        let stream_config: cpal::StreamConfig = config.into();

        let sample_rate = stream_config.sample_rate.0 as f64;
        let num_channels = stream_config.channels as usize;

        let (producer, consumer) = HeapRb::<TimelineCommand>::new(COMMAND_CAPACITY).split();

        let mut state = CallbackState {
            consumer,
            pending: Vec::new(),
            next_note: 0,
            origin_beat: 0.0,
            beat_pos: 0.0,
            voices: Vec::new(),
            sample_rate: sample_rate as f32,
            num_channels,
        };
        let shared = self.shared.clone();
        let patch = self.patch.clone();

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render_block(data, &mut state, &shared, &patch);
                },
                |err| warn!("audio stream error: {err}"),
                None,
            )
            .map_err(|e| EngineError::Stream(e.to_string()))?;

        info!(num_channels, sample_rate, "audio output opened");

        self.commands = Some(producer);
        self.stream = Some(stream);
        self.sample_rate = sample_rate;
        Ok(())
    }
}

impl AudioTimeline for AudioEngine {
    fn start(&mut self) -> Result<(), EngineError> {
        if self.stream.is_none() {
            self.open_stream()?;
        }
        if let Some(stream) = &self.stream {
            stream
                .play()
                .map_err(|e| EngineError::Stream(e.to_string()))?;
        }
        Ok(())
    }

    fn seconds(&self) -> f64 {
        if self.sample_rate > 0.0 {
            self.shared.samples_elapsed.load(Ordering::Relaxed) as f64 / self.sample_rate
        } else {
            0.0
        }
    }

    fn set_tempo(&mut self, bpm: f64) {
        self.shared.tempo_bits.store(bpm.to_bits(), Ordering::Relaxed);
    }

    fn schedule(&mut self, entries: Vec<ScheduleEntry>) -> Result<(), EngineError> {
        let tempo = f64::from_bits(self.shared.tempo_bits.load(Ordering::Relaxed));
        let beats_per_second = tempo / 60.0;

        let mut notes: Vec<FiringNote> = entries
            .iter()
            .map(|e| FiringNote {
                beat: e.engine_time * beats_per_second,
                duration_beats: e.duration * beats_per_second,
                freq: midi_to_freq(e.pitch),
                velocity: e.velocity,
            })
            .collect();
        notes.sort_by(|a, b| a.beat.total_cmp(&b.beat));

        let Some(commands) = self.commands.as_mut() else {
            return Err(EngineError::Schedule("engine not started".into()));
        };
        commands
            .try_push(TimelineCommand::Replace(notes))
            .map_err(|_| EngineError::Schedule("command queue full".into()))
    }

    fn cancel(&mut self) {
        if let Some(commands) = self.commands.as_mut() {
            if commands.try_push(TimelineCommand::Silence).is_err() {
                warn!("command queue full, silence request dropped");
            }
        }
    }
}

struct CallbackState {
    consumer: HeapCons<TimelineCommand>,
    pending: Vec<FiringNote>,
    next_note: usize,
    origin_beat: f64,
    beat_pos: f64,
    voices: Vec<Voice>,
    sample_rate: f32,
    num_channels: usize,
}

fn render_block(
    data: &mut [f32],
    state: &mut CallbackState,
    shared: &Arc<EngineShared>,
    patch: &Arc<ArcSwap<SynthPatch>>,
) {
    while let Some(command) = state.consumer.try_pop() {
        match command {
            TimelineCommand::Replace(notes) => {
                state.pending = notes;
                state.next_note = 0;
                state.origin_beat = state.beat_pos;
            }
            TimelineCommand::Silence => {
                state.pending.clear();
                state.next_note = 0;
                state.voices.clear();
            }
        }
    }

    let patch_guard = patch.load();
    let patch: &SynthPatch = &patch_guard;
    let tempo = f64::from_bits(shared.tempo_bits.load(Ordering::Relaxed));
    let beat_per_sample = tempo / 60.0 / f64::from(state.sample_rate);
    let dt = 1.0 / state.sample_rate;

    let num_frames = data.len() / state.num_channels;
    data.fill(0.0);

    for frame in 0..num_frames {
        while state.next_note < state.pending.len() {
            let note = &state.pending[state.next_note];
            if state.origin_beat + note.beat > state.beat_pos {
                break;
            }
            state.voices.push(Voice::new(
                note.freq,
                note.velocity,
                state.origin_beat + note.beat + note.duration_beats,
                patch.oscillators.len(),
            ));
            state.next_note += 1;
        }

        let mut sample = 0.0;
        for voice in &mut state.voices {
            if !voice.is_released() && state.beat_pos >= voice.release_beat {
                voice.release(&patch.adsr);
            }
            sample += voice.render(patch, state.sample_rate);
            voice.advance(&patch.adsr, dt);
        }
        sample *= patch.gain;

        let base = frame * state.num_channels;
        for channel in 0..state.num_channels {
            data[base + channel] = sample;
        }

        state.beat_pos += beat_per_sample;
    }

    state.voices.retain(|v| !v.is_finished(&patch.adsr));
    shared
        .samples_elapsed
        .fetch_add(num_frames as u64, Ordering::Relaxed);
}
