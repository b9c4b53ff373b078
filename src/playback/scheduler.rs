use super::{AudioTimeline, EngineError};
use crate::midi::NoteEvent;
use tracing::debug;

/// One engine-relative firing instruction. `engine_time` is seconds on the
/// engine clock measured from the start of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub engine_time: f64,
    pub duration: f64,
    pub pitch: u8,
    pub velocity: f32,
}

/// Live registration of firing instructions with the engine clock.
#[derive(Debug)]
pub struct ScheduleHandle {
    entry_count: usize,
}

/// Converts note events into engine firing instructions. Rate stretches
/// timing only; pitch and velocity pass through unchanged. Output is ordered
/// by engine time because the input is ordered by start time.
pub fn plan(events: &[NoteEvent], virtual_offset: f64, rate: f64) -> Vec<ScheduleEntry> {
    events
        .iter()
        .filter(|e| e.start >= virtual_offset)
        .map(|e| ScheduleEntry {
            engine_time: (e.start - virtual_offset) / rate,
            duration: e.duration / rate,
            pitch: e.pitch,
            velocity: e.velocity,
        })
        .collect()
}

/// Owns the at-most-one live schedule of a playback session. Single-owner
/// discipline: the controller stops the previous schedule before building
/// the next one.
#[derive(Debug, Default)]
pub struct Scheduler {
    handle: Option<ScheduleHandle>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }

    /// Registers a fresh schedule with the engine.
    pub fn build<E: AudioTimeline>(
        &mut self,
        engine: &mut E,
        events: &[NoteEvent],
        virtual_offset: f64,
        rate: f64,
    ) -> Result<(), EngineError> {
        debug_assert!(self.handle.is_none(), "previous schedule still live");

        let entries = plan(events, virtual_offset, rate);
        let entry_count = entries.len();
        engine.schedule(entries)?;
        debug!(entry_count, virtual_offset, rate, "schedule built");
        self.handle = Some(ScheduleHandle { entry_count });
        Ok(())
    }

    /// Halts pending firings and silences sounding voices. Calling this with
    /// nothing live is a no-op.
    pub fn stop<E: AudioTimeline>(&mut self, engine: &mut E) {
        if let Some(handle) = self.handle.take() {
            engine.cancel();
            debug!(entry_count = handle.entry_count, "schedule stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(pitch: u8, start: f64, duration: f64, velocity: f32) -> NoteEvent {
        NoteEvent {
            pitch,
            start,
            duration,
            velocity,
        }
    }

    fn two_notes() -> Vec<NoteEvent> {
        vec![note(60, 0.0, 1.0, 0.8), note(64, 0.5, 1.0, 0.6)]
    }

    #[test]
    fn unit_rate_keeps_song_timing() {
        let entries = plan(&two_notes(), 0.0, 1.0);
        assert_eq!(entries.len(), 2);
        assert!((entries[0].engine_time - 0.0).abs() < 1e-9);
        assert!((entries[1].engine_time - 0.5).abs() < 1e-9);
        assert!((entries[0].duration - 1.0).abs() < 1e-9);
    }

    #[test]
    fn double_rate_halves_engine_times() {
        let entries = plan(&two_notes(), 0.0, 2.0);
        assert!((entries[0].engine_time - 0.0).abs() < 1e-9);
        assert!((entries[1].engine_time - 0.25).abs() < 1e-9);
        assert!((entries[1].duration - 0.5).abs() < 1e-9);
    }

    #[test]
    fn pitch_and_velocity_pass_through_unchanged() {
        let entries = plan(&two_notes(), 0.0, 2.0);
        assert_eq!(entries[0].pitch, 60);
        assert_eq!(entries[1].pitch, 64);
        assert!((entries[0].velocity - 0.8).abs() < 1e-6);
        assert!((entries[1].velocity - 0.6).abs() < 1e-6);
    }

    #[test]
    fn events_before_the_offset_are_excluded() {
        let entries = plan(&two_notes(), 0.5, 1.0);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pitch, 64);
        // An event starting exactly at the offset fires immediately.
        assert!((entries[0].engine_time - 0.0).abs() < 1e-9);
    }

    #[test]
    fn engine_times_are_monotonic_across_rates() {
        let events = vec![
            note(60, 0.0, 0.5, 0.5),
            note(62, 0.25, 0.5, 0.5),
            note(64, 0.25, 0.5, 0.5),
            note(65, 1.0, 0.5, 0.5),
        ];
        for rate in [0.25, 0.5, 1.0, 1.7, 2.0] {
            let entries = plan(&events, 0.0, rate);
            for pair in entries.windows(2) {
                assert!(pair[0].engine_time <= pair[1].engine_time);
            }
            for (entry, event) in entries.iter().zip(&events) {
                assert!((entry.engine_time - event.start / rate).abs() < 1e-9);
            }
        }
    }
}
