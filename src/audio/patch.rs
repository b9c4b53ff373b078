use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Wave {
    Sine,
    Square,
    Saw,
}

impl Wave {
    /// Sample the waveform at a phase in [0, 1).
    pub fn sample(self, phase: f32) -> f32 {
        match self {
            Wave::Sine => (phase * 2.0 * std::f32::consts::PI).sin(),
            Wave::Square => {
                if phase < 0.5 {
                    -1.0
                } else {
                    1.0
                }
            }
            Wave::Saw => phase * 2.0 - 1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Wave::Sine => "Sine",
            Wave::Square => "Square",
            Wave::Saw => "Saw",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OscConfig {
    pub wave: Wave,
    pub gain: f32,
    pub semitone: i8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdsrConfig {
    /// Seconds
    pub attack: f32,
    /// Seconds
    pub decay: f32,
    /// 0.0 -> 1.0
    pub sustain: f32,
    /// Seconds
    pub release: f32,
}

impl Default for AdsrConfig {
    fn default() -> Self {
        Self {
            attack: 0.005,
            decay: 0.1,
            sustain: 0.3,
            release: 1.0,
        }
    }
}

/// Everything the audio callback needs to turn a firing into sound.
/// Hot-swappable while the stream runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthPatch {
    pub oscillators: Vec<OscConfig>,
    pub adsr: AdsrConfig,
    pub gain: f32,
}

impl SynthPatch {
    pub fn with_wave(wave: Wave) -> Self {
        Self {
            oscillators: vec![OscConfig {
                wave,
                gain: 1.0,
                semitone: 0,
            }],
            adsr: AdsrConfig::default(),
            gain: 0.5,
        }
    }
}

impl Default for SynthPatch {
    fn default() -> Self {
        Self::with_wave(Wave::Sine)
    }
}
