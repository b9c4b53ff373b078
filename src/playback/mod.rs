mod controller;
mod event_index;
mod scheduler;

pub use controller::{PlaybackController, PlaybackSnapshot, PlaybackStatus};
pub use event_index::EventIndex;
pub use scheduler::{plan, ScheduleEntry, ScheduleHandle, Scheduler};

use thiserror::Error;

pub const MIN_RATE: f64 = 0.25;
pub const MAX_RATE: f64 = 2.0;

/// Transport tempo at rate 1.0; the session rate scales it.
pub const REFERENCE_BPM: f64 = 120.0;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no audio output device available")]
    NoOutputDevice,
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("schedule rejected: {0}")]
    Schedule(String),
}

/// Clock-and-schedule surface of the audio engine.
///
/// The controller drives everything through this seam: it starts the engine,
/// registers schedules, and reads the clock back. Firing itself happens on
/// the engine's side, never in the polling loop.
pub trait AudioTimeline {
    /// Acquire the output stream (or confirm it is running). Fallible:
    /// platforms without an output device refuse here, before any schedule
    /// is registered.
    fn start(&mut self) -> Result<(), EngineError>;

    /// Monotonically increasing clock reading in seconds.
    fn seconds(&self) -> f64;

    /// Transport tempo in BPM.
    fn set_tempo(&mut self, bpm: f64);

    /// Register one schedule; entries fire autonomously on the engine clock.
    fn schedule(&mut self, entries: Vec<ScheduleEntry>) -> Result<(), EngineError>;

    /// Drop all pending firings and silence every sounding voice.
    fn cancel(&mut self);
}
