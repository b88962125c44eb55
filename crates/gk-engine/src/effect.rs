//! Insert effect instances.
//!
//! Each instance carries staged control parameters, the last-applied set,
//! and the derived coefficients; recomputation happens once per change at
//! block start, never inside the sample loop.

use alloc::{vec, vec::Vec};

use gk_ir::{EffectId, EffectKind, EffectParams};

use crate::filter::{Eq3Params, Eq3Unit};

/// Compressor control parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompressorParams {
    pub threshold_db: f32,
    pub ratio: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold_db: -12.0,
            ratio: 4.0,
        }
    }
}

/// Feedback compressor with smoothed gain reduction.
///
/// The threshold is converted to linear once per parameter change; the
/// attack/release smoothing factors depend only on the sample rate and
/// are computed at construction.
#[derive(Clone, Debug)]
pub struct CompressorUnit {
    staged: CompressorParams,
    applied: CompressorParams,
    threshold_linear: f32,
    gain: f32,
    attack_factor: f32,
    release_factor: f32,
    recomputes: u32,
}

impl CompressorUnit {
    /// Gain-smoothing time constants in seconds.
    const ATTACK_TC: f32 = 0.003;
    const RELEASE_TC: f32 = 0.1;

    pub fn new(sample_rate: f32) -> Self {
        let params = CompressorParams::default();
        let mut unit = Self {
            staged: params,
            applied: params,
            threshold_linear: 1.0,
            gain: 1.0,
            attack_factor: 1.0 - libm::expf(-1.0 / (Self::ATTACK_TC * sample_rate)),
            release_factor: 1.0 - libm::expf(-1.0 / (Self::RELEASE_TC * sample_rate)),
            recomputes: 0,
        };
        unit.recompute();
        unit.recomputes = 0;
        unit
    }

    pub fn set_params(&mut self, params: CompressorParams) {
        self.staged = params;
    }

    pub fn ensure_coeffs(&mut self) {
        if self.staged != self.applied {
            self.applied = self.staged;
            self.recompute();
            self.recomputes += 1;
        }
    }

    fn recompute(&mut self) {
        self.threshold_linear = libm::powf(10.0, self.applied.threshold_db / 20.0);
    }

    /// Compute the smoothed gain for one stereo sample pair.
    #[inline]
    fn step(&mut self, left: f32, right: f32) -> f32 {
        let level = libm::fabsf(left).max(libm::fabsf(right));

        if level < 0.001 || self.applied.threshold_db >= 0.0 {
            self.gain += (1.0 - self.gain) * self.release_factor;
            return self.gain;
        }

        let mut target = 1.0;
        if level > self.threshold_linear {
            let excess = (level - self.threshold_linear) / self.threshold_linear;
            let reduction = excess / self.applied.ratio;
            target = 1.0 / (1.0 + reduction);
        }

        let factor = if target < self.gain {
            self.attack_factor
        } else {
            self.release_factor
        };
        self.gain += (target - self.gain) * factor;
        self.gain
    }

    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for i in 0..left.len().min(right.len()) {
            let g = self.step(left[i], right[i]);
            left[i] *= g;
            right[i] *= g;
        }
    }

    pub fn reset_state(&mut self) {
        self.gain = 1.0;
    }

    pub fn recompute_count(&self) -> u32 {
        self.recomputes
    }
}

/// Fixed-size circular delay buffer.
#[derive(Clone, Debug)]
pub struct DelayLine {
    buffer: Vec<f32>,
    index: usize,
}

impl DelayLine {
    /// Buffers shorter than 16 samples are padded to keep the index
    /// arithmetic away from empty-buffer modulo.
    pub fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(16)],
            index: 0,
        }
    }

    /// Linear-interpolated read `delay_samples` behind the write head.
    pub fn read_interpolated(&self, delay_samples: f32) -> f32 {
        let delay_int = libm::floorf(delay_samples) as usize;
        let delay_frac = delay_samples - delay_int as f32;

        let len = self.buffer.len();
        let offset = delay_int % len;

        let idx1 = if self.index >= offset {
            self.index - offset
        } else {
            self.index + len - offset
        };
        let idx2 = if idx1 == 0 { len - 1 } else { idx1 - 1 };

        let s1 = self.buffer[idx1];
        let s2 = self.buffer[idx2];
        s1 + (s2 - s1) * delay_frac
    }

    pub fn write(&mut self, value: f32) {
        self.buffer[self.index] = value;
        self.index = (self.index + 1) % self.buffer.len();
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

/// Delay control parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DelayParams {
    pub time_ms: f32,
    pub feedback: f32,
    pub mix: f32,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            time_ms: 250.0,
            feedback: 0.35,
            mix: 0.3,
        }
    }
}

/// Stereo feedback delay with a cached tap offset.
#[derive(Clone, Debug)]
pub struct DelayUnit {
    staged: DelayParams,
    applied: DelayParams,
    sample_rate: f32,
    delay_samples: f32,
    feedback: f32,
    mix: f32,
    line_l: DelayLine,
    line_r: DelayLine,
    recomputes: u32,
}

impl DelayUnit {
    /// Maximum delay time; the lines are sized once at construction.
    const MAX_SECONDS: f32 = 2.0;

    pub fn new(sample_rate: f32) -> Self {
        let max = (sample_rate * Self::MAX_SECONDS) as usize;
        let params = DelayParams::default();
        let mut unit = Self {
            staged: params,
            applied: params,
            sample_rate,
            delay_samples: 0.0,
            feedback: 0.0,
            mix: 0.0,
            line_l: DelayLine::new(max),
            line_r: DelayLine::new(max),
            recomputes: 0,
        };
        unit.recompute();
        unit.recomputes = 0;
        unit
    }

    pub fn set_params(&mut self, params: DelayParams) {
        self.staged = params;
    }

    pub fn ensure_coeffs(&mut self) {
        if self.staged != self.applied {
            self.applied = self.staged;
            self.recompute();
            self.recomputes += 1;
        }
    }

    fn recompute(&mut self) {
        let max_samples = self.sample_rate * Self::MAX_SECONDS - 1.0;
        self.delay_samples = (self.applied.time_ms * 0.001 * self.sample_rate)
            .clamp(1.0, max_samples);
        self.feedback = self.applied.feedback.clamp(0.0, 0.95);
        self.mix = self.applied.mix.clamp(0.0, 1.0);
    }

    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for i in 0..left.len().min(right.len()) {
            let wet_l = self.line_l.read_interpolated(self.delay_samples);
            let wet_r = self.line_r.read_interpolated(self.delay_samples);

            let in_l = left[i] + wet_l * self.feedback;
            let in_r = right[i] + wet_r * self.feedback;
            self.line_l.write(if in_l.is_finite() { in_l } else { 0.0 });
            self.line_r.write(if in_r.is_finite() { in_r } else { 0.0 });

            left[i] = left[i] * (1.0 - self.mix) + wet_l * self.mix;
            right[i] = right[i] * (1.0 - self.mix) + wet_r * self.mix;
        }
    }

    pub fn reset_state(&mut self) {
        self.line_l.reset();
        self.line_r.reset();
    }

    pub fn recompute_count(&self) -> u32 {
        self.recomputes
    }
}

enum EffectUnit {
    Eq3 { left: Eq3Unit, right: Eq3Unit },
    Compressor(CompressorUnit),
    Delay(DelayUnit),
}

/// A live insert effect in a channel strip.
pub struct EffectInstance {
    pub id: EffectId,
    pub bypassed: bool,
    unit: EffectUnit,
}

impl EffectInstance {
    pub fn new(id: EffectId, params: &EffectParams, sample_rate: f32) -> Self {
        let mut instance = Self {
            id,
            bypassed: false,
            unit: match params.kind() {
                EffectKind::Eq3 => EffectUnit::Eq3 {
                    left: Eq3Unit::new(sample_rate),
                    right: Eq3Unit::new(sample_rate),
                },
                EffectKind::Compressor => {
                    EffectUnit::Compressor(CompressorUnit::new(sample_rate))
                }
                EffectKind::Delay => EffectUnit::Delay(DelayUnit::new(sample_rate)),
            },
        };
        instance.set_params(params);
        instance
    }

    pub fn kind(&self) -> EffectKind {
        match self.unit {
            EffectUnit::Eq3 { .. } => EffectKind::Eq3,
            EffectUnit::Compressor(_) => EffectKind::Compressor,
            EffectUnit::Delay(_) => EffectKind::Delay,
        }
    }

    /// Stage control parameters. A kind mismatch is logged and ignored.
    pub fn set_params(&mut self, params: &EffectParams) {
        let own_kind = self.kind();
        match (&mut self.unit, params) {
            (
                EffectUnit::Eq3 { left, right },
                EffectParams::Eq3 {
                    low_gain_db,
                    mid_gain_db,
                    high_gain_db,
                    low_freq,
                    high_freq,
                },
            ) => {
                let p = Eq3Params {
                    low_gain_db: *low_gain_db,
                    mid_gain_db: *mid_gain_db,
                    high_gain_db: *high_gain_db,
                    low_freq: *low_freq,
                    high_freq: *high_freq,
                };
                left.set_params(p);
                right.set_params(p);
            }
            (
                EffectUnit::Compressor(unit),
                EffectParams::Compressor {
                    threshold_db,
                    ratio,
                },
            ) => unit.set_params(CompressorParams {
                threshold_db: *threshold_db,
                ratio: *ratio,
            }),
            (
                EffectUnit::Delay(unit),
                EffectParams::Delay {
                    time_ms,
                    feedback,
                    mix,
                },
            ) => unit.set_params(DelayParams {
                time_ms: *time_ms,
                feedback: *feedback,
                mix: *mix,
            }),
            (_, params) => {
                log::warn!(
                    "parameter kind {:?} does not match effect {:?}",
                    params.kind(),
                    own_kind
                );
            }
        }
    }

    /// Process one block in place.
    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        match &mut self.unit {
            EffectUnit::Eq3 { left: eq_l, right: eq_r } => {
                eq_l.ensure_coeffs();
                eq_r.ensure_coeffs();
                for s in left.iter_mut() {
                    *s = eq_l.process(*s);
                }
                for s in right.iter_mut() {
                    *s = eq_r.process(*s);
                }
            }
            EffectUnit::Compressor(unit) => {
                unit.ensure_coeffs();
                unit.process_block(left, right);
            }
            EffectUnit::Delay(unit) => {
                unit.ensure_coeffs();
                unit.process_block(left, right);
            }
        }
    }

    /// Clear audio history (filter memory, delay buffers, gain smoothing).
    pub fn reset_state(&mut self) {
        match &mut self.unit {
            EffectUnit::Eq3 { left, right } => {
                left.reset_state();
                right.reset_state();
            }
            EffectUnit::Compressor(unit) => unit.reset_state(),
            EffectUnit::Delay(unit) => unit.reset_state(),
        }
    }

    /// Total coefficient recomputations across the unit's channels.
    pub fn recompute_count(&self) -> u32 {
        match &self.unit {
            EffectUnit::Eq3 { left, right } => left.recompute_count() + right.recompute_count(),
            EffectUnit::Compressor(unit) => unit.recompute_count(),
            EffectUnit::Delay(unit) => unit.recompute_count(),
        }
    }
}
