use crate::midi::NoteEvent;

/// Immutable, start-time-sorted view over a composition's notes.
///
/// Sorted once at construction (stable, so simultaneous notes keep decode
/// order) and read-only afterwards.
#[derive(Debug, Default)]
pub struct EventIndex {
    events: Vec<NoteEvent>,
}

impl EventIndex {
    pub fn new(mut events: Vec<NoteEvent>) -> Self {
        events.sort_by(|a, b| a.start.total_cmp(&b.start));
        Self { events }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[NoteEvent] {
        &self.events
    }

    /// Pitches sounding at `time`, sorted and deduplicated. A note counts as
    /// active through its exact end instant.
    pub fn active_at(&self, time: f64) -> Vec<u8> {
        let started = self.events.partition_point(|e| e.start <= time);
        let mut pitches: Vec<u8> = self.events[..started]
            .iter()
            .filter(|e| time <= e.end())
            .map(|e| e.pitch)
            .collect();
        pitches.sort_unstable();
        pitches.dedup();
        pitches
    }

    /// Events with `start >= time`, ascending by start time.
    pub fn starting_at(&self, time: f64) -> &[NoteEvent] {
        let from = self.events.partition_point(|e| e.start < time);
        &self.events[from..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(pitch: u8, start: f64, duration: f64) -> NoteEvent {
        NoteEvent {
            pitch,
            start,
            duration,
            velocity: 0.8,
        }
    }

    fn two_note_index() -> EventIndex {
        EventIndex::new(vec![note(60, 0.0, 1.0), note(64, 0.5, 1.0)])
    }

    #[test]
    fn overlapping_notes_are_both_active() {
        assert_eq!(two_note_index().active_at(0.75), vec![60, 64]);
    }

    #[test]
    fn boundary_instants_are_inclusive() {
        let index = two_note_index();
        assert_eq!(index.active_at(0.0), vec![60]);
        assert_eq!(index.active_at(0.5), vec![60, 64]);
        // A note stays active through its exact end instant.
        assert_eq!(index.active_at(1.0), vec![60, 64]);
        assert_eq!(index.active_at(1.5), vec![64]);
    }

    #[test]
    fn time_past_every_note_is_silent() {
        assert!(two_note_index().active_at(5.0).is_empty());
    }

    #[test]
    fn empty_index_has_no_active_notes() {
        assert!(EventIndex::empty().active_at(0.0).is_empty());
        assert!(EventIndex::empty().starting_at(0.0).is_empty());
    }

    #[test]
    fn duplicate_pitches_collapse() {
        let index = EventIndex::new(vec![note(60, 0.0, 1.0), note(60, 0.2, 1.0)]);
        assert_eq!(index.active_at(0.5), vec![60]);
    }

    #[test]
    fn starting_at_returns_ordered_suffix() {
        let index = two_note_index();
        let suffix = index.starting_at(0.5);
        assert_eq!(suffix.len(), 1);
        assert_eq!(suffix[0].pitch, 64);

        assert_eq!(index.starting_at(0.0).len(), 2);
        assert!(index.starting_at(2.0).is_empty());
    }

    #[test]
    fn construction_sorts_by_start_time() {
        let index = EventIndex::new(vec![note(64, 0.5, 1.0), note(60, 0.0, 1.0)]);
        let events = index.events();
        assert_eq!(events[0].pitch, 60);
        assert_eq!(events[1].pitch, 64);
    }
}
