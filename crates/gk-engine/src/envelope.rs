//! Per-voice ADSR envelope.

/// Envelope phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnvPhase {
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// ADSR control parameters, times in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdsrParams {
    pub attack: f32,
    pub decay: f32,
    /// Sustain level, 0.0 - 1.0
    pub sustain: f32,
    pub release: f32,
}

impl Default for AdsrParams {
    fn default() -> Self {
        Self {
            attack: 0.001,
            decay: 0.1,
            sustain: 1.0,
            release: 0.05,
        }
    }
}

/// Linear-segment ADSR with per-phase step precomputation.
///
/// Steps are recomputed only when the parameters actually change; the
/// per-sample path is pure add/compare.
#[derive(Clone, Debug)]
pub struct AdsrEnvelope {
    params: AdsrParams,
    sample_rate: f32,
    phase: EnvPhase,
    value: f32,
    attack_step: f32,
    decay_step: f32,
    release_step: f32,
}

impl AdsrEnvelope {
    pub fn new(sample_rate: f32) -> Self {
        let mut env = Self {
            params: AdsrParams::default(),
            sample_rate,
            phase: EnvPhase::Idle,
            value: 0.0,
            attack_step: 0.0,
            decay_step: 0.0,
            release_step: 0.0,
        };
        env.recalculate_steps();
        env
    }

    /// Stage new parameters; steps recompute only on change.
    pub fn set_params(&mut self, mut params: AdsrParams) {
        params.sustain = params.sustain.clamp(0.0, 1.0);
        if params != self.params {
            self.params = params;
            self.recalculate_steps();
        }
    }

    pub fn params(&self) -> AdsrParams {
        self.params
    }

    fn recalculate_steps(&mut self) {
        let attack_samples = self.params.attack * self.sample_rate;
        let decay_samples = self.params.decay * self.sample_rate;
        let release_samples = self.params.release * self.sample_rate;

        self.attack_step = if attack_samples > 0.0 {
            1.0 / attack_samples
        } else {
            1.0
        };
        let decay_dist = 1.0 - self.params.sustain;
        self.decay_step = if decay_samples > 0.0 {
            decay_dist / decay_samples
        } else {
            decay_dist
        };
        // Constant release rate scaled for a full 1.0 -> 0.0 drop.
        self.release_step = if release_samples > 0.0 {
            1.0 / release_samples
        } else {
            1.0
        };
    }

    /// Begin the attack phase. The current value is kept so a retrigger
    /// of a sounding voice does not click.
    pub fn trigger(&mut self) {
        self.phase = EnvPhase::Attack;
    }

    /// Begin the release phase.
    pub fn release(&mut self) {
        if self.phase != EnvPhase::Idle {
            self.phase = EnvPhase::Release;
        }
    }

    /// Advance one sample and return the current level.
    pub fn process(&mut self) -> f32 {
        match self.phase {
            EnvPhase::Idle => {
                self.value = 0.0;
            }
            EnvPhase::Attack => {
                self.value += self.attack_step;
                if self.value >= 1.0 {
                    self.value = 1.0;
                    self.phase = EnvPhase::Decay;
                }
            }
            EnvPhase::Decay => {
                self.value -= self.decay_step;
                if self.value <= self.params.sustain {
                    self.value = self.params.sustain;
                    self.phase = EnvPhase::Sustain;
                }
            }
            EnvPhase::Sustain => {
                self.value = self.params.sustain;
            }
            EnvPhase::Release => {
                self.value -= self.release_step;
                if self.value <= 0.0 {
                    self.value = 0.0;
                    self.phase = EnvPhase::Idle;
                }
            }
        }
        self.value
    }

    pub fn phase(&self) -> EnvPhase {
        self.phase
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn is_active(&self) -> bool {
        self.phase != EnvPhase::Idle
    }

    /// Exact number of samples the release tail would take from the
    /// current level. Used to derive the voice-return block countdown.
    pub fn release_tail_samples(&self) -> u64 {
        if self.release_step <= 0.0 || self.value <= 0.0 {
            return 0;
        }
        libm::ceilf(self.value / self.release_step) as u64
    }

    /// Drop to idle immediately.
    pub fn reset(&mut self) {
        self.phase = EnvPhase::Idle;
        self.value = 0.0;
    }
}
