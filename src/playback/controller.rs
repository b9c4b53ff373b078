use super::{AudioTimeline, EngineError, EventIndex, Scheduler, MAX_RATE, MIN_RATE, REFERENCE_BPM};
use crate::midi::{self, DecodeError, MidiComposition, NoteEvent, FALLBACK_DURATION};
use crossbeam::channel::{Receiver, Sender};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Stopped,
    Playing,
}

/// One published view of the session. Immutable once created, so observers
/// never see a half-applied transition.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub current_time: f64,
    pub active_notes: Vec<u8>,
    pub is_playing: bool,
}

/// Root of the playback session. Owns the engine, the single live schedule,
/// and the event index of the loaded composition; every state transition
/// goes through here.
pub struct PlaybackController<E: AudioTimeline> {
    engine: E,
    scheduler: Scheduler,
    index: EventIndex,
    loaded: bool,
    duration: f64,
    status: PlaybackStatus,
    position: f64,
    rate: f64,
    virtual_offset: f64,
    engine_clock_at_start: f64,
    active_notes: Vec<u8>,
    observers: Vec<Sender<PlaybackSnapshot>>,
}

impl<E: AudioTimeline> PlaybackController<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            scheduler: Scheduler::new(),
            index: EventIndex::empty(),
            loaded: false,
            duration: 0.0,
            status: PlaybackStatus::Stopped,
            position: 0.0,
            rate: 1.0,
            virtual_offset: 0.0,
            engine_clock_at_start: 0.0,
            active_notes: Vec::new(),
            observers: Vec::new(),
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn has_composition(&self) -> bool {
        self.loaded
    }

    pub fn notes(&self) -> &[NoteEvent] {
        self.index.events()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Observers receive one snapshot per published transition or tick.
    pub fn subscribe(&mut self) -> Receiver<PlaybackSnapshot> {
        let (tx, rx) = crossbeam::channel::unbounded();
        self.observers.push(tx);
        rx
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            current_time: self.position,
            active_notes: self.active_notes.clone(),
            is_playing: self.is_playing(),
        }
    }

    fn publish(&mut self) {
        let snapshot = self.snapshot();
        self.observers.retain(|tx| tx.send(snapshot.clone()).is_ok());
    }

    /// Installs a decoded composition, replacing whatever was loaded.
    pub fn set_composition(&mut self, composition: MidiComposition) {
        self.stop();
        self.duration = if composition.duration > 0.0 {
            composition.duration
        } else {
            FALLBACK_DURATION
        };
        self.index = EventIndex::new(composition.notes);
        self.loaded = true;
    }

    /// Decodes and installs a MIDI file. A decode failure leaves the session
    /// with an unplayable placeholder composition and is reported to the
    /// caller; it is never fatal.
    pub fn load_composition(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        match midi::decode(bytes) {
            Ok(composition) => {
                info!(
                    notes = composition.notes.len(),
                    duration = composition.duration,
                    "composition loaded"
                );
                self.set_composition(composition);
                Ok(())
            }
            Err(err) => {
                warn!(%err, "decode failed, composition is unplayable");
                self.stop();
                self.index = EventIndex::empty();
                self.duration = FALLBACK_DURATION;
                self.loaded = false;
                Err(err)
            }
        }
    }

    /// Drops the loaded composition (e.g. its file was deleted).
    pub fn unload(&mut self) {
        self.stop();
        self.index = EventIndex::empty();
        self.duration = 0.0;
        self.loaded = false;
    }

    /// Stopped -> Playing. Re-entrant: calling while already playing rebuilds
    /// the schedule from the current position.
    pub fn play(&mut self) -> Result<(), EngineError> {
        if !self.loaded {
            return Ok(());
        }
        if self.position >= self.duration {
            self.position = 0.0;
        }
        self.virtual_offset = self.position;

        if let Err(err) = self.start_run() {
            // Roll back: no schedule may outlive a failed start.
            self.scheduler.stop(&mut self.engine);
            self.status = PlaybackStatus::Stopped;
            return Err(err);
        }

        self.engine_clock_at_start = self.engine.seconds();
        self.status = PlaybackStatus::Playing;
        self.publish();
        Ok(())
    }

    fn start_run(&mut self) -> Result<(), EngineError> {
        self.engine.start()?;
        self.engine.set_tempo(REFERENCE_BPM * self.rate);
        self.scheduler.stop(&mut self.engine);
        self.scheduler.build(
            &mut self.engine,
            self.index.starting_at(self.virtual_offset),
            self.virtual_offset,
            self.rate,
        )
    }

    /// Playing -> Stopped, freezing the position at the current virtual time.
    /// Active-note highlights stay as they were.
    pub fn pause(&mut self) {
        if self.status != PlaybackStatus::Playing {
            return;
        }
        self.position = self.current_virtual_time();
        self.scheduler.stop(&mut self.engine);
        self.status = PlaybackStatus::Stopped;
        self.publish();
    }

    /// Full stop: position back to zero, highlights cleared. Idempotent.
    pub fn stop(&mut self) {
        self.scheduler.stop(&mut self.engine);
        self.status = PlaybackStatus::Stopped;
        self.position = 0.0;
        self.active_notes.clear();
        self.publish();
    }

    /// Moves the playhead, clamped to the composition. While playing this
    /// restarts the schedule from the target; while stopped it only moves
    /// the position.
    pub fn seek(&mut self, time: f64) -> Result<(), EngineError> {
        let target = time.clamp(0.0, self.duration);
        if self.status == PlaybackStatus::Playing {
            self.scheduler.stop(&mut self.engine);
            self.position = target;
            self.play()
        } else {
            self.position = target;
            self.publish();
            Ok(())
        }
    }

    /// Changes the playback rate, clamped to [0.25, 2.0]. While playing the
    /// schedule is rebuilt from the current virtual time at the new rate.
    pub fn set_rate(&mut self, rate: f64) -> Result<(), EngineError> {
        let clamped = rate.clamp(MIN_RATE, MAX_RATE);
        if self.status == PlaybackStatus::Playing {
            // Freeze position under the old rate before it changes.
            self.position = self.current_virtual_time();
            self.scheduler.stop(&mut self.engine);
            self.rate = clamped;
            self.play()
        } else {
            self.rate = clamped;
            Ok(())
        }
    }

    fn current_virtual_time(&self) -> f64 {
        let elapsed = self.engine.seconds() - self.engine_clock_at_start;
        (self.virtual_offset + elapsed * self.rate).clamp(0.0, self.duration)
    }

    /// Polling step, called once per display frame while playing: derives
    /// the virtual time from the engine clock, recomputes active notes, and
    /// publishes one snapshot. Does nothing when stopped, so a tick queued
    /// across a cancellation publishes nothing.
    pub fn tick(&mut self) -> Option<PlaybackSnapshot> {
        if self.status != PlaybackStatus::Playing {
            return None;
        }

        let virtual_time = self.current_virtual_time();
        if virtual_time >= self.duration {
            info!("end of composition");
            self.stop();
            return Some(self.snapshot());
        }

        self.position = virtual_time;
        self.active_notes = self.index.active_at(virtual_time);
        self.publish();
        Some(self.snapshot())
    }
}

impl<E: AudioTimeline> Drop for PlaybackController<E> {
    fn drop(&mut self) {
        self.scheduler.stop(&mut self.engine);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::ScheduleEntry;

    /// Manually advanced stand-in for the audio engine.
    #[derive(Default)]
    struct ManualTimeline {
        clock: f64,
        tempo: f64,
        scheduled: Option<Vec<ScheduleEntry>>,
        starts: usize,
        cancels: usize,
        fail_start: bool,
    }

    impl AudioTimeline for ManualTimeline {
        fn start(&mut self) -> Result<(), EngineError> {
            if self.fail_start {
                return Err(EngineError::NoOutputDevice);
            }
            self.starts += 1;
            Ok(())
        }

        fn seconds(&self) -> f64 {
            self.clock
        }

        fn set_tempo(&mut self, bpm: f64) {
            self.tempo = bpm;
        }

        fn schedule(&mut self, entries: Vec<ScheduleEntry>) -> Result<(), EngineError> {
            self.scheduled = Some(entries);
            Ok(())
        }

        fn cancel(&mut self) {
            self.cancels += 1;
            self.scheduled = None;
        }
    }

    fn note(pitch: u8, start: f64, duration: f64, velocity: f32) -> NoteEvent {
        NoteEvent {
            pitch,
            start,
            duration,
            velocity,
        }
    }

    fn two_note_controller() -> PlaybackController<ManualTimeline> {
        let mut controller = PlaybackController::new(ManualTimeline::default());
        controller.set_composition(MidiComposition {
            duration: 1.5,
            notes: vec![note(60, 0.0, 1.0, 0.8), note(64, 0.5, 1.0, 0.6)],
        });
        controller
    }

    #[test]
    fn play_without_composition_is_a_no_op() {
        let mut controller = PlaybackController::new(ManualTimeline::default());
        controller.play().unwrap();
        assert!(!controller.is_playing());
        assert!(controller.engine().scheduled.is_none());
        assert_eq!(controller.engine().starts, 0);
    }

    #[test]
    fn play_schedules_whole_composition_and_scales_tempo() {
        let mut controller = two_note_controller();
        controller.play().unwrap();

        assert!(controller.is_playing());
        assert!((controller.engine().tempo - 120.0).abs() < 1e-9);
        let entries = controller.engine().scheduled.as_ref().unwrap();
        assert_eq!(entries.len(), 2);
        assert!((entries[0].engine_time - 0.0).abs() < 1e-9);
        assert!((entries[1].engine_time - 0.5).abs() < 1e-9);
    }

    #[test]
    fn seek_then_play_schedules_only_the_suffix() {
        let mut controller = two_note_controller();
        controller.seek(0.5).unwrap();
        controller.play().unwrap();

        let entries = controller.engine().scheduled.as_ref().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pitch, 64);
        // Seek target equals the note's start, so it fires immediately.
        assert!((entries[0].engine_time - 0.0).abs() < 1e-9);
    }

    #[test]
    fn double_rate_compresses_the_schedule() {
        let mut controller = two_note_controller();
        controller.set_rate(2.0).unwrap();
        controller.play().unwrap();

        assert!((controller.engine().tempo - 240.0).abs() < 1e-9);
        let entries = controller.engine().scheduled.as_ref().unwrap();
        assert!((entries[0].engine_time - 0.0).abs() < 1e-9);
        assert!((entries[1].engine_time - 0.25).abs() < 1e-9);
    }

    #[test]
    fn tick_advances_virtual_time_and_active_notes() {
        let mut controller = two_note_controller();
        controller.play().unwrap();

        controller.engine_mut().clock = 0.75;
        let snapshot = controller.tick().unwrap();
        assert!((snapshot.current_time - 0.75).abs() < 1e-9);
        assert_eq!(snapshot.active_notes, vec![60, 64]);
        assert!(snapshot.is_playing);
    }

    #[test]
    fn rate_scales_virtual_time_against_the_engine_clock() {
        let mut controller = two_note_controller();
        controller.set_rate(2.0).unwrap();
        controller.play().unwrap();

        // 0.5 engine seconds at rate 2.0 is one virtual second.
        controller.engine_mut().clock = 0.5;
        let snapshot = controller.tick().unwrap();
        assert!((snapshot.current_time - 1.0).abs() < 1e-9);
    }

    #[test]
    fn end_of_composition_transitions_to_stopped() {
        let mut controller = PlaybackController::new(ManualTimeline::default());
        controller.set_composition(MidiComposition {
            duration: 2.0,
            notes: vec![note(60, 0.0, 2.0, 0.8)],
        });
        controller.play().unwrap();

        controller.engine_mut().clock = 1.0;
        assert!(controller.tick().unwrap().is_playing);

        controller.engine_mut().clock = 2.5;
        let snapshot = controller.tick().unwrap();
        assert!(!snapshot.is_playing);
        assert_eq!(snapshot.current_time, 0.0);
        assert!(snapshot.active_notes.is_empty());
        assert!(!controller.scheduler.is_live());

        // The loop checks status at the top of each tick; a queued tick
        // after the transition publishes nothing.
        assert!(controller.tick().is_none());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut controller = two_note_controller();
        controller.play().unwrap();
        controller.engine_mut().clock = 0.75;
        controller.tick();

        controller.stop();
        let once = controller.snapshot();
        controller.stop();
        let twice = controller.snapshot();

        assert_eq!(once, twice);
        assert!(!once.is_playing);
        assert_eq!(once.current_time, 0.0);
        assert!(once.active_notes.is_empty());
        // The second stop found nothing live, so the engine saw one cancel.
        assert_eq!(controller.engine().cancels, 1);
    }

    #[test]
    fn pause_freezes_position_and_keeps_highlights() {
        let mut controller = two_note_controller();
        controller.play().unwrap();
        controller.engine_mut().clock = 0.75;
        controller.tick();

        controller.pause();
        let snapshot = controller.snapshot();
        assert!(!snapshot.is_playing);
        assert!((snapshot.current_time - 0.75).abs() < 1e-9);
        assert_eq!(snapshot.active_notes, vec![60, 64]);
    }

    #[test]
    fn resume_after_pause_starts_from_the_frozen_position() {
        let mut controller = two_note_controller();
        controller.play().unwrap();
        controller.engine_mut().clock = 0.25;
        controller.tick();
        controller.pause();

        controller.play().unwrap();
        assert!((controller.position() - 0.25).abs() < 1e-9);
        let entries = controller.engine().scheduled.as_ref().unwrap();
        // Note A is already behind the playhead and is not re-fired.
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pitch, 64);
        assert!((entries[0].engine_time - 0.25).abs() < 1e-9);
    }

    #[test]
    fn play_past_the_end_restarts_from_zero() {
        let mut controller = two_note_controller();
        controller.seek(1.5).unwrap();
        controller.play().unwrap();

        let entries = controller.engine().scheduled.as_ref().unwrap();
        assert_eq!(entries.len(), 2);
        assert!((controller.position() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn seek_and_rate_inputs_are_clamped() {
        let mut controller = two_note_controller();
        controller.seek(99.0).unwrap();
        assert!((controller.position() - 1.5).abs() < 1e-9);
        controller.seek(-3.0).unwrap();
        assert_eq!(controller.position(), 0.0);

        controller.set_rate(10.0).unwrap();
        assert!((controller.rate() - 2.0).abs() < 1e-9);
        controller.set_rate(0.0).unwrap();
        assert!((controller.rate() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn failed_engine_start_rolls_back_to_stopped() {
        let mut controller = two_note_controller();
        controller.engine_mut().fail_start = true;

        assert!(matches!(
            controller.play(),
            Err(EngineError::NoOutputDevice)
        ));
        assert!(!controller.is_playing());
        assert!(!controller.scheduler.is_live());
        assert!(controller.engine().scheduled.is_none());
    }

    #[test]
    fn rate_change_while_playing_rebuilds_from_current_time() {
        let mut controller = two_note_controller();
        controller.play().unwrap();
        controller.engine_mut().clock = 0.25;
        controller.tick();

        controller.set_rate(0.5).unwrap();
        assert!(controller.is_playing());
        assert!((controller.engine().tempo - 60.0).abs() < 1e-9);
        let entries = controller.engine().scheduled.as_ref().unwrap();
        // Only the second note is still ahead of the playhead.
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pitch, 64);
        assert!((entries[0].engine_time - (0.5 - 0.25) / 0.5).abs() < 1e-9);
    }

    #[test]
    fn observers_receive_published_snapshots() {
        let mut controller = two_note_controller();
        let updates = controller.subscribe();

        controller.play().unwrap();
        controller.engine_mut().clock = 0.75;
        controller.tick();

        let mut last = None;
        while let Ok(snapshot) = updates.try_recv() {
            last = Some(snapshot);
        }
        let last = last.unwrap();
        assert!(last.is_playing);
        assert!((last.current_time - 0.75).abs() < 1e-9);
        assert_eq!(last.active_notes, vec![60, 64]);
    }
}
