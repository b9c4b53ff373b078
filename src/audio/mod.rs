mod engine;
mod patch;
mod voice;

pub use engine::AudioEngine;
pub use patch::{AdsrConfig, OscConfig, SynthPatch, Wave};
pub use voice::{EnvelopeStage, Voice};

pub fn midi_to_freq(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((f32::from(note) - 69.0) / 12.0)
}
