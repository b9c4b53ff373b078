pub mod audio;
pub mod library;
pub mod midi;
pub mod playback;
pub mod ui;

pub use audio::{AudioEngine, SynthPatch};
pub use library::MidiLibrary;
pub use playback::PlaybackController;
pub use ui::MidirollApp;
