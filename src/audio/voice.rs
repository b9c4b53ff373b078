use super::patch::{AdsrConfig, SynthPatch};

#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeStage {
    Attack { time: f32 },
    Decay { time: f32 },
    Sustain,
    Release { time: f32 },
}

/// One sounding note inside the audio callback. `release_beat` is the
/// transport beat at which the note-off lands.
pub struct Voice {
    pub freq: f32,
    pub velocity: f32,
    pub release_beat: f64,
    stage: EnvelopeStage,
    release_level: f32,
    phases: Vec<f32>,
}

impl Voice {
    pub fn new(freq: f32, velocity: f32, release_beat: f64, num_oscillators: usize) -> Self {
        Self {
            freq,
            velocity,
            release_beat,
            stage: EnvelopeStage::Attack { time: 0.0 },
            release_level: 0.0,
            phases: vec![0.0; num_oscillators],
        }
    }

    pub fn envelope(&self, adsr: &AdsrConfig) -> f32 {
        match self.stage {
            EnvelopeStage::Attack { time } => {
                if adsr.attack == 0.0 {
                    1.0
                } else {
                    (time / adsr.attack).min(1.0)
                }
            }
            EnvelopeStage::Decay { time } => {
                let progress = if adsr.decay == 0.0 {
                    1.0
                } else {
                    (time / adsr.decay).min(1.0)
                };
                1.0 - (1.0 - adsr.sustain) * progress
            }
            EnvelopeStage::Sustain => adsr.sustain,
            EnvelopeStage::Release { time } => {
                let progress = if adsr.release == 0.0 {
                    1.0
                } else {
                    (time / adsr.release).min(1.0)
                };
                self.release_level * (1.0 - progress)
            }
        }
    }

    /// Advance the envelope clock by `dt` seconds.
    pub fn advance(&mut self, adsr: &AdsrConfig, dt: f32) {
        match &mut self.stage {
            EnvelopeStage::Attack { time } => {
                *time += dt;
                if *time >= adsr.attack {
                    self.stage = EnvelopeStage::Decay { time: 0.0 };
                }
            }
            EnvelopeStage::Decay { time } => {
                *time += dt;
                if *time >= adsr.decay {
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => {}
            EnvelopeStage::Release { time } => {
                *time += dt;
            }
        }
    }

    /// Enter the release stage, remembering the level to fade out from.
    pub fn release(&mut self, adsr: &AdsrConfig) {
        if !matches!(self.stage, EnvelopeStage::Release { .. }) {
            self.release_level = self.envelope(adsr);
            self.stage = EnvelopeStage::Release { time: 0.0 };
        }
    }

    pub fn is_released(&self) -> bool {
        matches!(self.stage, EnvelopeStage::Release { .. })
    }

    pub fn is_finished(&self, adsr: &AdsrConfig) -> bool {
        matches!(self.stage, EnvelopeStage::Release { time } if time > adsr.release)
    }

    /// Render one mono sample and advance the oscillator phases.
    pub fn render(&mut self, patch: &SynthPatch, sample_rate: f32) -> f32 {
        let envelope = self.envelope(&patch.adsr);
        let mut sample = 0.0;

        for (phase, osc) in self.phases.iter_mut().zip(&patch.oscillators) {
            let freq = self.freq * 2.0_f32.powf(f32::from(osc.semitone) / 12.0);
            sample += osc.wave.sample(*phase) * osc.gain;

            *phase += freq / sample_rate;
            if *phase >= 1.0 {
                *phase -= 1.0;
            }
        }

        sample * envelope * self.velocity
    }
}
