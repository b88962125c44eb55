//! Voice: one pre-allocated unit of sounding state.

use crate::envelope::{AdsrEnvelope, AdsrParams, EnvPhase};
use crate::filter::{SvfParams, SvfUnit};
use crate::instrument::SampleData;

/// Voice lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoiceState {
    /// In the pool's free list.
    #[default]
    Idle,
    /// Bound to a note, envelope gated on.
    Active,
    /// Note released; counting down the release tail in render blocks.
    Releasing,
}

/// Sound source state for a voice.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VoiceSource {
    Silent,
    /// Naive sawtooth oscillator; phase in [0, 1).
    Osc { phase: f32, incr: f32 },
    /// Sample playback at a fractional read position.
    Slice { position: f64, rate: f64 },
}

/// Equal-tempered frequency for a MIDI note.
pub fn note_frequency(note: u8) -> f32 {
    440.0 * libm::powf(2.0, (note as f32 - 69.0) / 12.0)
}

/// Four-point Hermite interpolation for sample playback.
fn hermite(frac: f32, s0: f32, s1: f32, s2: f32, s3: f32) -> f32 {
    let c0 = s1;
    let c1 = 0.5 * (s2 - s0);
    let c2 = s0 - 2.5 * s1 + 2.0 * s2 - 0.5 * s3;
    let c3 = 0.5 * (s3 - s0) + 1.5 * (s1 - s2);
    ((c3 * frac + c2) * frac + c1) * frac + c0
}

/// A single voice. Pre-allocated at pool construction; only its state
/// transitions afterwards.
#[derive(Clone, Debug)]
pub struct Voice {
    pub state: VoiceState,
    pub note: u8,
    pub velocity: u8,
    /// Allocation order stamp; smaller means older.
    pub age: u64,
    pub envelope: AdsrEnvelope,
    filter_l: SvfUnit,
    filter_r: SvfUnit,
    filter_enabled: bool,
    pub source: VoiceSource,
    /// Render blocks left before return-to-pool (Releasing only).
    pub release_blocks: u32,
    /// Source material ran out (one-shot sample reached its end).
    pub finished: bool,
}

impl Voice {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            state: VoiceState::Idle,
            note: 0,
            velocity: 0,
            age: 0,
            envelope: AdsrEnvelope::new(sample_rate),
            filter_l: SvfUnit::new(sample_rate),
            filter_r: SvfUnit::new(sample_rate),
            filter_enabled: false,
            source: VoiceSource::Silent,
            release_blocks: 0,
            finished: false,
        }
    }

    /// Bind the voice to a note and gate the envelope on.
    ///
    /// Filter history is cleared so a reused voice does not click with
    /// the previous note's state; the coefficient cache survives and only
    /// recomputes if the staged parameters differ.
    pub fn start(
        &mut self,
        note: u8,
        velocity: u8,
        age: u64,
        source: VoiceSource,
        adsr: AdsrParams,
        filter: Option<SvfParams>,
    ) {
        self.state = VoiceState::Active;
        self.note = note;
        self.velocity = velocity;
        self.age = age;
        self.source = source;
        self.release_blocks = 0;
        self.finished = false;

        self.envelope.set_params(adsr);
        self.envelope.trigger();

        self.filter_enabled = filter.is_some();
        if let Some(params) = filter {
            self.filter_l.set_params(params);
            self.filter_r.set_params(params);
        }
        self.filter_l.reset_state();
        self.filter_r.reset_state();
    }

    /// Rebind to a new note without retriggering the envelope (legato).
    pub fn retune(&mut self, note: u8, source: VoiceSource) {
        self.note = note;
        self.source = source;
        self.finished = false;
    }

    /// Begin the release phase and return the exact tail length in
    /// samples at the current envelope level.
    pub fn begin_release(&mut self) -> u64 {
        self.state = VoiceState::Releasing;
        let tail = self.envelope.release_tail_samples();
        self.envelope.release();
        tail
    }

    pub fn is_attack(&self) -> bool {
        self.envelope.phase() == EnvPhase::Attack
    }

    pub fn amplitude(&self) -> f32 {
        self.envelope.value()
    }

    /// Render and sum into the output slices.
    pub fn render(&mut self, sample: Option<&SampleData>, out_l: &mut [f32], out_r: &mut [f32], gain: f32) {
        if self.state == VoiceState::Idle || self.finished {
            return;
        }

        if self.filter_enabled {
            self.filter_l.ensure_coeffs();
            self.filter_r.ensure_coeffs();
        }

        let vgain = gain * self.velocity as f32 / 127.0;
        let frames = out_l.len().min(out_r.len());

        for i in 0..frames {
            let env = self.envelope.process();
            let (mut l, mut r) = self.next_source_sample(sample);

            if self.filter_enabled {
                l = self.filter_l.process(l);
                r = self.filter_r.process(r);
            }

            out_l[i] += l * env * vgain;
            out_r[i] += r * env * vgain;

            if self.finished {
                break;
            }
        }
    }

    /// Pull one sample from the source and advance it.
    #[inline]
    fn next_source_sample(&mut self, sample: Option<&SampleData>) -> (f32, f32) {
        match &mut self.source {
            VoiceSource::Silent => (0.0, 0.0),
            VoiceSource::Osc { phase, incr } => {
                let s = 2.0 * *phase - 1.0;
                *phase += *incr;
                if *phase >= 1.0 {
                    *phase -= 1.0;
                }
                (s, s)
            }
            VoiceSource::Slice { position, rate } => {
                let Some(data) = sample else {
                    self.finished = true;
                    return (0.0, 0.0);
                };
                let len = data.left.len();
                if len < 2 || *position >= (len - 1) as f64 {
                    self.finished = true;
                    return (0.0, 0.0);
                }

                let pos_floor = libm::floor(*position);
                let frac = (*position - pos_floor) as f32;
                let idx = pos_floor as usize;

                let i0 = idx.saturating_sub(1);
                let i1 = idx;
                let i2 = (idx + 1).min(len - 1);
                let i3 = (idx + 2).min(len - 1);

                let l = hermite(frac, data.left[i0], data.left[i1], data.left[i2], data.left[i3]);
                let r = if data.right.len() == len {
                    hermite(frac, data.right[i0], data.right[i1], data.right[i2], data.right[i3])
                } else {
                    l
                };

                *position += *rate;
                (l, r)
            }
        }
    }

    /// Zero all mutable state and drop to idle. Owned buffers survive.
    pub fn reset(&mut self) {
        self.state = VoiceState::Idle;
        self.note = 0;
        self.velocity = 0;
        self.envelope.reset();
        self.filter_l.reset_state();
        self.filter_r.reset_state();
        self.source = VoiceSource::Silent;
        self.release_blocks = 0;
        self.finished = false;
    }
}
