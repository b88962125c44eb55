//! Filters with cached coefficient sets.
//!
//! Every unit here follows the same contract: control parameters are
//! staged with `set_params`, compared against the last-applied set at the
//! start of each block, and coefficients recompute exactly once per
//! change. The per-sample loops are multiply-accumulate only; all
//! transcendental math lives in the recompute paths.

use core::f32::consts::PI;

/// State-variable filter response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    LowPass,
    HighPass,
    BandPass,
    Notch,
}

/// Control parameters for the state-variable filter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SvfParams {
    pub cutoff: f32,
    pub q: f32,
    pub kind: FilterKind,
}

impl Default for SvfParams {
    fn default() -> Self {
        Self {
            cutoff: 1000.0,
            q: 0.707,
            kind: FilterKind::LowPass,
        }
    }
}

/// Chamberlin state-variable filter with a cached tuning coefficient.
///
/// Stable for cutoff below roughly fs/6; the cutoff clamp keeps audible
/// settings inside that range at common sample rates.
#[derive(Clone, Debug)]
pub struct SvfUnit {
    staged: SvfParams,
    applied: SvfParams,
    sample_rate: f32,
    /// Cached tuning coefficient: 2 sin(pi f / fs)
    f: f32,
    q_inv: f32,
    z1: f32,
    z2: f32,
    recomputes: u32,
}

impl SvfUnit {
    pub fn new(sample_rate: f32) -> Self {
        let params = SvfParams::default();
        let mut unit = Self {
            staged: params,
            applied: params,
            sample_rate,
            f: 0.0,
            q_inv: 0.0,
            z1: 0.0,
            z2: 0.0,
            recomputes: 0,
        };
        unit.recompute();
        unit.recomputes = 0;
        unit
    }

    /// Stage new control parameters. Cheap; no recomputation happens here.
    pub fn set_params(&mut self, params: SvfParams) {
        self.staged = params;
    }

    /// Compare staged parameters to the applied set and recompute the
    /// coefficients once if they differ. Call at block (or slice) start.
    pub fn ensure_coeffs(&mut self) {
        if self.staged != self.applied {
            self.applied = self.staged;
            self.recompute();
            self.recomputes += 1;
        }
    }

    fn recompute(&mut self) {
        let cutoff = self.applied.cutoff.clamp(20.0, 20_000.0);
        let q = self.applied.q.max(0.1);
        self.f = 2.0 * libm::sinf(PI * cutoff / self.sample_rate);
        self.q_inv = 1.0 / q;
    }

    /// Process one sample against the cached coefficients.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let low = self.z2 + self.f * self.z1;
        let high = input - low - self.q_inv * self.z1;
        let band = self.f * high + self.z1;
        let notch = high + low;

        self.z1 = band;
        self.z2 = low;

        match self.applied.kind {
            FilterKind::LowPass => low,
            FilterKind::HighPass => high,
            FilterKind::BandPass => band,
            FilterKind::Notch => notch,
        }
    }

    /// Clear filter history without touching the coefficient cache.
    pub fn reset_state(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// Number of coefficient recomputations since construction.
    pub fn recompute_count(&self) -> u32 {
        self.recomputes
    }
}

/// Direct-form biquad section.
#[derive(Clone, Copy, Debug, Default)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    /// Unity passthrough.
    pub fn identity() -> Self {
        Self {
            b0: 1.0,
            ..Default::default()
        }
    }

    pub fn set_coefficients(&mut self, c: BiquadCoeffs) {
        self.b0 = c.b0;
        self.b1 = c.b1;
        self.b2 = c.b2;
        self.a1 = c.a1;
        self.a2 = c.a2;
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }

    pub fn reset_state(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// Normalized biquad coefficient set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

/// Low-shelf coefficients (RBJ form).
pub fn low_shelf(frequency: f32, gain_db: f32, sample_rate: f32) -> BiquadCoeffs {
    let omega = 2.0 * PI * frequency / sample_rate;
    let sin_omega = libm::sinf(omega);
    let cos_omega = libm::cosf(omega);
    let alpha = sin_omega / 2.0;
    let a = libm::powf(10.0, gain_db / 40.0);
    let sqrt_a = libm::sqrtf(a);

    let b0 = a * ((a + 1.0) - (a - 1.0) * cos_omega + 2.0 * sqrt_a * alpha);
    let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega);
    let b2 = a * ((a + 1.0) - (a - 1.0) * cos_omega - 2.0 * sqrt_a * alpha);
    let a0 = (a + 1.0) + (a - 1.0) * cos_omega + 2.0 * sqrt_a * alpha;
    let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega);
    let a2 = (a + 1.0) + (a - 1.0) * cos_omega - 2.0 * sqrt_a * alpha;

    BiquadCoeffs {
        b0: b0 / a0,
        b1: b1 / a0,
        b2: b2 / a0,
        a1: a1 / a0,
        a2: a2 / a0,
    }
}

/// High-shelf coefficients (RBJ form).
pub fn high_shelf(frequency: f32, gain_db: f32, sample_rate: f32) -> BiquadCoeffs {
    let omega = 2.0 * PI * frequency / sample_rate;
    let sin_omega = libm::sinf(omega);
    let cos_omega = libm::cosf(omega);
    let alpha = sin_omega / 2.0;
    let a = libm::powf(10.0, gain_db / 40.0);
    let sqrt_a = libm::sqrtf(a);

    let b0 = a * ((a + 1.0) + (a - 1.0) * cos_omega + 2.0 * sqrt_a * alpha);
    let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega);
    let b2 = a * ((a + 1.0) + (a - 1.0) * cos_omega - 2.0 * sqrt_a * alpha);
    let a0 = (a + 1.0) - (a - 1.0) * cos_omega + 2.0 * sqrt_a * alpha;
    let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_omega);
    let a2 = (a + 1.0) - (a - 1.0) * cos_omega - 2.0 * sqrt_a * alpha;

    BiquadCoeffs {
        b0: b0 / a0,
        b1: b1 / a0,
        b2: b2 / a0,
        a1: a1 / a0,
        a2: a2 / a0,
    }
}

/// Peaking-EQ coefficients (RBJ form).
pub fn peaking(frequency: f32, gain_db: f32, sample_rate: f32) -> BiquadCoeffs {
    let omega = 2.0 * PI * frequency / sample_rate;
    let sin_omega = libm::sinf(omega);
    let cos_omega = libm::cosf(omega);
    let alpha = sin_omega / 2.0;
    let a = libm::powf(10.0, gain_db / 40.0);

    let b0 = 1.0 + alpha * a;
    let b1 = -2.0 * cos_omega;
    let b2 = 1.0 - alpha * a;
    let a0 = 1.0 + alpha / a;
    let a1 = -2.0 * cos_omega;
    let a2 = 1.0 - alpha / a;

    BiquadCoeffs {
        b0: b0 / a0,
        b1: b1 / a0,
        b2: b2 / a0,
        a1: a1 / a0,
        a2: a2 / a0,
    }
}

/// Three-band EQ control parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Eq3Params {
    pub low_gain_db: f32,
    pub mid_gain_db: f32,
    pub high_gain_db: f32,
    pub low_freq: f32,
    pub high_freq: f32,
}

impl Default for Eq3Params {
    fn default() -> Self {
        Self {
            low_gain_db: 0.0,
            mid_gain_db: 0.0,
            high_gain_db: 0.0,
            low_freq: 320.0,
            high_freq: 3200.0,
        }
    }
}

/// Mid-band center frequency for the peaking section.
const EQ3_MID_FREQ: f32 = 1000.0;

/// Mono three-band EQ: low shelf, 1 kHz peak, high shelf.
#[derive(Clone, Debug)]
pub struct Eq3Unit {
    staged: Eq3Params,
    applied: Eq3Params,
    sample_rate: f32,
    low: Biquad,
    mid: Biquad,
    high: Biquad,
    recomputes: u32,
}

impl Eq3Unit {
    pub fn new(sample_rate: f32) -> Self {
        let mut unit = Self {
            staged: Eq3Params::default(),
            applied: Eq3Params::default(),
            sample_rate,
            low: Biquad::identity(),
            mid: Biquad::identity(),
            high: Biquad::identity(),
            recomputes: 0,
        };
        unit.recompute();
        unit.recomputes = 0;
        unit
    }

    pub fn set_params(&mut self, params: Eq3Params) {
        self.staged = params;
    }

    /// Recompute all three bands once if the staged parameters changed.
    pub fn ensure_coeffs(&mut self) {
        if self.staged != self.applied {
            self.applied = self.staged;
            self.recompute();
            self.recomputes += 1;
        }
    }

    fn recompute(&mut self) {
        let p = self.applied;
        self.low
            .set_coefficients(low_shelf(p.low_freq, p.low_gain_db, self.sample_rate));
        self.mid
            .set_coefficients(peaking(EQ3_MID_FREQ, p.mid_gain_db, self.sample_rate));
        self.high
            .set_coefficients(high_shelf(p.high_freq, p.high_gain_db, self.sample_rate));
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.high.process(self.mid.process(self.low.process(input)))
    }

    pub fn reset_state(&mut self) {
        self.low.reset_state();
        self.mid.reset_state();
        self.high.reset_state();
    }

    pub fn recompute_count(&self) -> u32 {
        self.recomputes
    }
}
