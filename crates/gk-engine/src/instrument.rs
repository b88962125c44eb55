//! Instrument layer: a voice pool plus its source material.
//!
//! Every instrument type runs on the same pre-allocated pool, whether its
//! voices synthesize or replay sample data — steady-state playback never
//! heap-allocates either way.

use alloc::vec::Vec;

use gk_ir::ChannelId;

use crate::envelope::AdsrParams;
use crate::filter::SvfParams;
use crate::voice::{note_frequency, VoiceSource};
use crate::voice_pool::{Retrigger, StealPolicy, VoicePool};

/// What a voice reads for audio.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceSpec {
    /// Sawtooth oscillator tuned to the note.
    #[default]
    Osc,
    /// Pitched playback of the instrument's sample, rooted at C-4.
    Slice,
}

/// Owned sample material. An empty right channel means mono.
#[derive(Clone, Debug, Default)]
pub struct SampleData {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl SampleData {
    pub fn mono(left: Vec<f32>) -> Self {
        Self {
            left,
            right: Vec::new(),
        }
    }

    pub fn stereo(left: Vec<f32>, right: Vec<f32>) -> Self {
        Self { left, right }
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Per-instrument configuration.
#[derive(Clone, Copy, Debug)]
pub struct InstrumentParams {
    pub adsr: AdsrParams,
    pub filter: Option<SvfParams>,
    pub retrigger: Retrigger,
    pub steal: StealPolicy,
    pub gain: f32,
    /// Mixer channel the instrument renders into.
    pub channel: ChannelId,
    pub source: SourceSpec,
    /// Voice pool capacity.
    pub voices: usize,
}

impl Default for InstrumentParams {
    fn default() -> Self {
        Self {
            adsr: AdsrParams::default(),
            filter: None,
            retrigger: Retrigger::Poly,
            steal: StealPolicy::Steal,
            gain: 0.5,
            channel: 0,
            source: SourceSpec::Osc,
            voices: 16,
        }
    }
}

/// MIDI root note for unpitched slice playback.
const ROOT_NOTE: u8 = 60;

/// Binding slot used for clip-launched voices.
const CLIP_NOTE: u8 = 127;

/// A playable instrument backed by a fixed voice pool.
pub struct Instrument {
    params: InstrumentParams,
    pool: VoicePool,
    sample: Option<SampleData>,
    sample_rate: f32,
}

impl Instrument {
    pub fn new(params: InstrumentParams, sample_rate: f32, block_size: usize) -> Self {
        Self {
            pool: VoicePool::new(params.voices, sample_rate, block_size),
            params,
            sample: None,
            sample_rate,
        }
    }

    pub fn params(&self) -> &InstrumentParams {
        &self.params
    }

    pub fn set_sample(&mut self, sample: SampleData) {
        self.sample = Some(sample);
    }

    fn source_for(&self, note: u8) -> VoiceSource {
        match self.params.source {
            SourceSpec::Osc => VoiceSource::Osc {
                phase: 0.0,
                incr: note_frequency(note) / self.sample_rate,
            },
            SourceSpec::Slice => VoiceSource::Slice {
                position: 0.0,
                rate: (note_frequency(note) / note_frequency(ROOT_NOTE)) as f64,
            },
        }
    }

    /// Trigger a note. Returns the bound pool slot, or None on denial.
    pub fn note_on(&mut self, note: u8, velocity: u8) -> Option<usize> {
        self.pool.allocate(
            note,
            velocity,
            self.source_for(note),
            self.params.adsr,
            self.params.filter,
            self.params.retrigger,
            self.params.steal,
        )
    }

    /// Release a note. Returns the number of voices entering release.
    pub fn note_off(&mut self, note: u8) -> usize {
        self.pool.release(note)
    }

    /// Launch the instrument's sample as a one-shot clip voice.
    pub fn trigger_clip(&mut self, _clip: u16) -> Option<usize> {
        self.pool.allocate(
            CLIP_NOTE,
            127,
            VoiceSource::Slice {
                position: 0.0,
                rate: 1.0,
            },
            self.params.adsr,
            self.params.filter,
            Retrigger::Poly,
            self.params.steal,
        )
    }

    /// Render all voices into the given output slices.
    pub fn render(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        self.pool
            .render_into(self.sample.as_ref(), out_l, out_r, self.params.gain);
    }

    /// Per-block bookkeeping: release countdowns, finished-voice reaping.
    pub fn finish_block(&mut self) {
        self.pool.advance_block();
    }

    /// Force-silence and cancel all pending voice returns.
    pub fn dispose(&mut self) {
        self.pool.dispose();
    }

    pub fn pool(&self) -> &VoicePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 44_100.0;
    const BLOCK: usize = 128;

    fn osc_instrument() -> Instrument {
        Instrument::new(InstrumentParams::default(), SR, BLOCK)
    }

    #[test]
    fn note_on_binds_a_voice() {
        let mut inst = osc_instrument();
        assert!(inst.note_on(60, 100).is_some());
        assert_eq!(inst.pool().active_count(), 1);
    }

    #[test]
    fn render_is_audible() {
        let mut inst = osc_instrument();
        inst.note_on(60, 110);
        let mut l = [0.0f32; BLOCK];
        let mut r = [0.0f32; BLOCK];
        inst.render(&mut l, &mut r);
        assert!(l.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn slice_instrument_plays_sample() {
        let mut inst = Instrument::new(
            InstrumentParams {
                source: SourceSpec::Slice,
                ..Default::default()
            },
            SR,
            BLOCK,
        );
        inst.set_sample(SampleData::mono(vec![0.5; 4096]));
        inst.note_on(60, 127);
        let mut l = [0.0f32; BLOCK];
        let mut r = [0.0f32; BLOCK];
        inst.render(&mut l, &mut r);
        assert!(l.iter().any(|&s| s.abs() > 0.01));
    }

    #[test]
    fn clip_trigger_is_independent_of_notes() {
        let mut inst = Instrument::new(
            InstrumentParams {
                source: SourceSpec::Slice,
                ..Default::default()
            },
            SR,
            BLOCK,
        );
        inst.set_sample(SampleData::mono(vec![0.5; 4096]));
        inst.note_on(60, 100);
        inst.trigger_clip(0);
        assert_eq!(inst.pool().active_count(), 2);

        // Releasing the melodic note leaves the clip voice sounding.
        inst.note_off(60);
        assert_eq!(inst.pool().active_count(), 1);
    }

    #[test]
    fn dispose_silences_everything() {
        let mut inst = osc_instrument();
        inst.note_on(60, 100);
        inst.note_on(64, 100);
        inst.dispose();
        assert_eq!(inst.pool().active_count(), 0);
        assert_eq!(inst.pool().free_count(), inst.pool().capacity());
    }
}
