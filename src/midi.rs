use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use thiserror::Error;

/// Placeholder duration shown when a file decodes to nothing playable.
pub const FALLBACK_DURATION: f64 = 10.0;

/// 120 BPM, the SMF default when no tempo meta event is present.
const DEFAULT_US_PER_QUARTER: f64 = 500_000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    pub pitch: u8,
    /// Seconds from the start of the composition.
    pub start: f64,
    /// Seconds, always positive.
    pub duration: f64,
    /// 0.0 -> 1.0
    pub velocity: f32,
}

impl NoteEvent {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Decoder output: every track flattened into one note list.
#[derive(Debug, Clone, Default)]
pub struct MidiComposition {
    pub duration: f64,
    pub notes: Vec<NoteEvent>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed MIDI data: {0}")]
    Malformed(#[from] midly::Error),
    #[error("MIDI file contains no tracks")]
    NoTracks,
}

/// Decodes a Standard MIDI File into absolute-time note events.
///
/// NoteOn with velocity 0 counts as NoteOff; notes still open when their
/// track ends are closed at the track's final tick. Zero-length notes are
/// dropped.
pub fn decode(bytes: &[u8]) -> Result<MidiComposition, DecodeError> {
    let smf = Smf::parse(bytes)?;
    if smf.tracks.is_empty() {
        return Err(DecodeError::NoTracks);
    }

    let clock = TickClock::from_smf(&smf);
    let mut notes = Vec::new();

    for track in &smf.tracks {
        let mut tick = 0u64;
        let mut open: Vec<OpenNote> = Vec::new();

        for event in track {
            tick += u64::from(event.delta.as_int());
            if let TrackEventKind::Midi { channel, message } = event.kind {
                match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        open.push(OpenNote {
                            channel: channel.as_int(),
                            key: key.as_int(),
                            start_tick: tick,
                            velocity: f32::from(vel.as_int()) / 127.0,
                        });
                    }
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        if let Some(idx) = open
                            .iter()
                            .position(|n| n.channel == channel.as_int() && n.key == key.as_int())
                        {
                            let note = open.remove(idx);
                            push_note(&mut notes, &clock, note, tick);
                        }
                    }
                    _ => {}
                }
            }
        }

        for note in open {
            push_note(&mut notes, &clock, note, tick);
        }
    }

    let duration = notes.iter().map(NoteEvent::end).fold(0.0, f64::max);
    Ok(MidiComposition { duration, notes })
}

struct OpenNote {
    channel: u8,
    key: u8,
    start_tick: u64,
    velocity: f32,
}

fn push_note(notes: &mut Vec<NoteEvent>, clock: &TickClock, note: OpenNote, end_tick: u64) {
    let start = clock.seconds_at(note.start_tick);
    let end = clock.seconds_at(end_tick);
    if end > start {
        notes.push(NoteEvent {
            pitch: note.key,
            start,
            duration: end - start,
            velocity: note.velocity,
        });
    }
}

/// Piecewise tick-to-seconds conversion honoring the file's tempo meta
/// events. Each segment: (start tick, seconds at that tick, seconds per tick).
struct TickClock {
    segments: Vec<(u64, f64, f64)>,
}

impl TickClock {
    fn from_smf(smf: &Smf) -> Self {
        match smf.header.timing {
            Timing::Metrical(tpb) => {
                let ticks_per_beat = f64::from(tpb.as_int());

                let mut changes: Vec<(u64, f64)> = Vec::new();
                for track in &smf.tracks {
                    let mut tick = 0u64;
                    for event in track {
                        tick += u64::from(event.delta.as_int());
                        if let TrackEventKind::Meta(MetaMessage::Tempo(uspq)) = event.kind {
                            changes.push((tick, f64::from(uspq.as_int())));
                        }
                    }
                }
                changes.sort_by_key(|&(tick, _)| tick);

                let mut seg_tick = 0u64;
                let mut seg_seconds = 0.0;
                let mut seg_rate = DEFAULT_US_PER_QUARTER / 1_000_000.0 / ticks_per_beat;
                let mut segments = Vec::with_capacity(changes.len() + 1);

                for (tick, uspq) in changes {
                    let rate = uspq / 1_000_000.0 / ticks_per_beat;
                    if tick == seg_tick {
                        seg_rate = rate;
                        continue;
                    }
                    segments.push((seg_tick, seg_seconds, seg_rate));
                    seg_seconds += (tick - seg_tick) as f64 * seg_rate;
                    seg_tick = tick;
                    seg_rate = rate;
                }
                segments.push((seg_tick, seg_seconds, seg_rate));

                Self { segments }
            }
            Timing::Timecode(fps, subframe) => {
                let ticks_per_second = f64::from(fps.as_int()) * f64::from(subframe);
                Self {
                    segments: vec![(0, 0.0, 1.0 / ticks_per_second)],
                }
            }
        }
    }

    fn seconds_at(&self, tick: u64) -> f64 {
        for &(seg_tick, seg_seconds, rate) in self.segments.iter().rev() {
            if tick >= seg_tick {
                return seg_seconds + (tick - seg_tick) as f64 * rate;
            }
        }
        0.0
    }
}
