//! Fixed-capacity voice pool with priority stealing.
//!
//! Voices are pre-allocated at construction and only transition state
//! afterwards. Every voice is in exactly one of three places: the free
//! list, the per-note binding lists (Active), or the releasing countdown
//! (Releasing). The only path back to the free list runs through
//! [`VoicePool::advance_block`], so double-returns are structurally
//! impossible rather than merely avoided.

use alloc::vec::Vec;
use arrayvec::ArrayVec;

use crate::envelope::AdsrParams;
use crate::filter::SvfParams;
use crate::instrument::SampleData;
use crate::voice::{Voice, VoiceSource, VoiceState};

/// Hard upper bound on pool capacity.
pub const MAX_VOICES: usize = 64;

/// How a new note interacts with voices already bound to the instrument.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Retrigger {
    /// Every note-on gets an independent voice; overlapping triggers of
    /// the same note coexist and release independently.
    #[default]
    Poly,
    /// One voice at a time; a new note cuts the previous one immediately.
    Mono,
    /// Monophonic without envelope retrigger: a sounding voice is retuned
    /// to the new note.
    Legato,
}

/// What to do when the pool is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StealPolicy {
    /// Reclaim the lowest-priority voice.
    #[default]
    Steal,
    /// Refuse the allocation (logged, never fatal).
    Deny,
}

/// Fixed pool of reusable voices.
pub struct VoicePool {
    voices: Vec<Voice>,
    /// Free slot indices; popped lowest-index-first.
    free: Vec<u8>,
    /// Per-note lists of Active slots. A list, not a single slot: under
    /// polyphonic overlap a second allocation must never orphan the
    /// tracking of the first.
    bindings: [ArrayVec<u8, MAX_VOICES>; 128],
    age_counter: u64,
    block_size: u32,
    steals: u64,
    denials: u64,
    invalid_releases: u64,
}

impl VoicePool {
    /// Create a pool of `capacity` voices (clamped to [`MAX_VOICES`]).
    pub fn new(capacity: usize, sample_rate: f32, block_size: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_VOICES);
        Self {
            voices: (0..capacity).map(|_| Voice::new(sample_rate)).collect(),
            free: (0..capacity as u8).rev().collect(),
            bindings: core::array::from_fn(|_| ArrayVec::new()),
            age_counter: 0,
            block_size: block_size as u32,
            steals: 0,
            denials: 0,
            invalid_releases: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    /// Bind a voice to `note`, stealing if the pool is full and the
    /// policy allows it. Returns the slot index, or None on denial.
    #[allow(clippy::too_many_arguments)]
    pub fn allocate(
        &mut self,
        note: u8,
        velocity: u8,
        source: VoiceSource,
        adsr: AdsrParams,
        filter: Option<SvfParams>,
        retrigger: Retrigger,
        steal: StealPolicy,
    ) -> Option<usize> {
        let note = note & 0x7F;

        match retrigger {
            Retrigger::Legato => {
                if let Some(slot) = self.first_active_slot() {
                    let old_note = self.voices[slot].note;
                    self.unbind(old_note, slot);
                    self.voices[slot].retune(note, source);
                    self.bindings[note as usize].push(slot as u8);
                    return Some(slot);
                }
            }
            Retrigger::Mono => self.cut_active_voices(),
            Retrigger::Poly => {}
        }

        let slot = match self.free.pop() {
            Some(s) => s as usize,
            None => match steal {
                StealPolicy::Deny => {
                    self.denials += 1;
                    log::warn!("voice pool exhausted, note {} denied", note);
                    return None;
                }
                StealPolicy::Steal => {
                    let Some(victim) = self.find_steal_candidate() else {
                        self.denials += 1;
                        return None;
                    };
                    self.evict(victim);
                    self.steals += 1;
                    victim
                }
            },
        };

        self.age_counter += 1;
        self.voices[slot].start(note, velocity, self.age_counter, source, adsr, filter);
        self.bindings[note as usize].push(slot as u8);
        Some(slot)
    }

    /// Choose the lowest-priority non-idle voice.
    ///
    /// Priority key, compared lexicographically: releasing voices first,
    /// then sustaining/decaying, with attack-phase voices steal-proof
    /// unless nothing else exists; within a band, quieter, older, and
    /// softer-velocity voices go first. Ties resolve to the lowest slot
    /// index (iteration order with strict comparison).
    fn find_steal_candidate(&self) -> Option<usize> {
        let mut best: Option<(u8, u32, u64, u8)> = None;
        let mut best_slot = None;

        for (slot, voice) in self.voices.iter().enumerate() {
            let band = match voice.state {
                VoiceState::Idle => continue,
                VoiceState::Releasing => 0u8,
                VoiceState::Active => {
                    if voice.is_attack() {
                        2
                    } else {
                        1
                    }
                }
            };
            let key = (
                band,
                (voice.amplitude() * 1000.0) as u32,
                voice.age,
                voice.velocity,
            );
            if best.map_or(true, |b| key < b) {
                best = Some(key);
                best_slot = Some(slot);
            }
        }
        best_slot
    }

    /// Tear a voice out for reuse. Active voices are unbound from their
    /// note; releasing voices already left the bindings at release time.
    fn evict(&mut self, slot: usize) {
        if self.voices[slot].state == VoiceState::Active {
            let note = self.voices[slot].note;
            self.unbind(note, slot);
        }
        self.voices[slot].reset();
    }

    /// Release the oldest voice bound to `note`. Returns the number of
    /// voices that entered the release phase (0 or 1).
    ///
    /// Overlapping triggers of one note release first-in-first-out, one
    /// voice per note-off, so releasing one never affects the others. The
    /// release tail is converted to a countdown of render blocks;
    /// [`advance_block`](Self::advance_block) returns the voice to the
    /// free list when it expires. Releasing a note with no bound voice is
    /// a logged no-op.
    pub fn release(&mut self, note: u8) -> usize {
        let note = note & 0x7F;
        if self.bindings[note as usize].is_empty() {
            self.invalid_releases += 1;
            log::warn!("release for note {} with no bound voice", note);
            return 0;
        }

        let slot = self.bindings[note as usize].remove(0) as usize;
        self.release_slot(slot);
        1
    }

    /// Release everything that is currently bound.
    pub fn release_all(&mut self) {
        for note in 0..128usize {
            let slots = core::mem::take(&mut self.bindings[note]);
            for &slot in &slots {
                self.release_slot(slot as usize);
            }
        }
    }

    fn release_slot(&mut self, slot: usize) {
        let tail = self.voices[slot].begin_release();
        let blocks = tail.div_ceil(self.block_size as u64).max(1);
        self.voices[slot].release_blocks = blocks as u32;
    }

    /// Immediately silence all Active voices (mono retrigger cut).
    fn cut_active_voices(&mut self) {
        for slot in 0..self.voices.len() {
            if self.voices[slot].state == VoiceState::Active {
                let note = self.voices[slot].note;
                self.unbind(note, slot);
                self.park(slot);
            }
        }
    }

    fn first_active_slot(&self) -> Option<usize> {
        self.voices
            .iter()
            .position(|v| v.state == VoiceState::Active)
    }

    fn unbind(&mut self, note: u8, slot: usize) {
        self.bindings[(note & 0x7F) as usize].retain(|s| *s != slot as u8);
    }

    /// The only transition into the free list.
    fn park(&mut self, slot: usize) {
        debug_assert!(self.voices[slot].state != VoiceState::Idle);
        self.voices[slot].reset();
        self.free.push(slot as u8);
    }

    /// Advance release countdowns and reap finished voices. The render
    /// context calls this once per block after rendering.
    pub fn advance_block(&mut self) {
        for slot in 0..self.voices.len() {
            match self.voices[slot].state {
                VoiceState::Releasing => {
                    self.voices[slot].release_blocks =
                        self.voices[slot].release_blocks.saturating_sub(1);
                    if self.voices[slot].release_blocks == 0 {
                        self.park(slot);
                    }
                }
                VoiceState::Active => {
                    if self.voices[slot].finished {
                        let note = self.voices[slot].note;
                        self.unbind(note, slot);
                        self.park(slot);
                    }
                }
                VoiceState::Idle => {}
            }
        }
    }

    /// Render all sounding voices into the output slices.
    pub fn render_into(
        &mut self,
        sample: Option<&SampleData>,
        out_l: &mut [f32],
        out_r: &mut [f32],
        gain: f32,
    ) {
        for voice in &mut self.voices {
            if voice.state != VoiceState::Idle {
                voice.render(sample, out_l, out_r, gain);
            }
        }
    }

    /// Force-reset everything and cancel all pending scheduled returns.
    pub fn dispose(&mut self) {
        for voice in &mut self.voices {
            voice.reset();
        }
        for list in &mut self.bindings {
            list.clear();
        }
        self.free.clear();
        for slot in (0..self.voices.len() as u8).rev() {
            self.free.push(slot);
        }
    }

    // --- Introspection ---

    pub fn active_count(&self) -> usize {
        self.voices
            .iter()
            .filter(|v| v.state == VoiceState::Active)
            .count()
    }

    pub fn releasing_count(&self) -> usize {
        self.voices
            .iter()
            .filter(|v| v.state == VoiceState::Releasing)
            .count()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Slots currently bound to `note`.
    pub fn bound(&self, note: u8) -> &[u8] {
        &self.bindings[(note & 0x7F) as usize]
    }

    pub fn voice(&self, slot: usize) -> Option<&Voice> {
        self.voices.get(slot)
    }

    pub fn steal_count(&self) -> u64 {
        self.steals
    }

    pub fn denial_count(&self) -> u64 {
        self.denials
    }

    pub fn invalid_release_count(&self) -> u64 {
        self.invalid_releases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::note_frequency;

    const SR: f32 = 48_000.0;
    const BLOCK: usize = 128;

    fn pool(capacity: usize) -> VoicePool {
        VoicePool::new(capacity, SR, BLOCK)
    }

    fn osc(note: u8) -> VoiceSource {
        VoiceSource::Osc {
            phase: 0.0,
            incr: note_frequency(note) / SR,
        }
    }

    fn sustained() -> AdsrParams {
        AdsrParams {
            attack: 0.0,
            decay: 0.0,
            sustain: 1.0,
            release: 0.3,
        }
    }

    fn alloc(p: &mut VoicePool, note: u8) -> Option<usize> {
        p.allocate(
            note,
            100,
            osc(note),
            sustained(),
            None,
            Retrigger::Poly,
            StealPolicy::Steal,
        )
    }

    /// Run one render block so envelopes advance past the attack.
    fn run_block(p: &mut VoicePool) {
        let mut l = [0.0f32; BLOCK];
        let mut r = [0.0f32; BLOCK];
        p.render_into(None, &mut l, &mut r, 1.0);
        p.advance_block();
    }

    #[test]
    fn capacity_invariant_holds_under_pressure() {
        let mut p = pool(4);
        for note in 0..40u8 {
            alloc(&mut p, 60 + (note % 12));
            assert!(p.active_count() + p.releasing_count() <= 4);
            if note % 3 == 0 {
                p.release(60 + (note % 12));
            }
            assert!(p.active_count() + p.releasing_count() <= 4);
        }
    }

    #[test]
    fn voices_partition_across_three_sets() {
        let mut p = pool(4);
        alloc(&mut p, 60);
        alloc(&mut p, 62);
        p.release(60);
        assert_eq!(p.active_count(), 1);
        assert_eq!(p.releasing_count(), 1);
        assert_eq!(p.free_count(), 2);
        assert_eq!(
            p.active_count() + p.releasing_count() + p.free_count(),
            p.capacity()
        );
    }

    #[test]
    fn fill_pool_then_steal_exactly_one() {
        let mut p = pool(4);
        for note in [60, 62, 64, 65] {
            alloc(&mut p, note);
        }
        assert_eq!(p.active_count(), 4);

        alloc(&mut p, 67);
        assert_eq!(p.active_count(), 4);
        assert_eq!(p.steal_count(), 1);
        assert_eq!(p.bound(67).len(), 1);
        // Exactly one of the original four lost its voice.
        let survivors: usize = [60, 62, 64, 65].iter().map(|&n| p.bound(n).len()).sum();
        assert_eq!(survivors, 3);
    }

    #[test]
    fn releasing_voice_is_preferred_steal_target() {
        let mut p = pool(4);
        for note in [60, 62, 64, 65] {
            alloc(&mut p, note);
        }
        run_block(&mut p);
        p.release(62);
        let released_slot = {
            // The voice for 62 is now releasing; find it by state.
            (0..4)
                .find(|&s| p.voice(s).unwrap().state == VoiceState::Releasing)
                .unwrap()
        };

        let new_slot = alloc(&mut p, 70).unwrap();
        assert_eq!(new_slot, released_slot);
        // Attack-phase voices survived even though they were newer.
        assert_eq!(p.bound(60).len() + p.bound(64).len() + p.bound(65).len(), 3);
    }

    #[test]
    fn attack_voice_never_stolen_while_alternative_exists() {
        let mut p = pool(2);
        let slow_attack = AdsrParams {
            attack: 1.0,
            decay: 0.0,
            sustain: 1.0,
            release: 0.1,
        };
        // Voice 0: past attack (instant envelope). Voice 1: in attack.
        p.allocate(60, 100, osc(60), sustained(), None, Retrigger::Poly, StealPolicy::Steal);
        run_block(&mut p);
        p.allocate(62, 100, osc(62), slow_attack, None, Retrigger::Poly, StealPolicy::Steal);

        let stolen = p
            .allocate(64, 100, osc(64), sustained(), None, Retrigger::Poly, StealPolicy::Steal)
            .unwrap();
        assert_eq!(stolen, 0, "the non-attack voice should be the victim");
        assert_eq!(p.bound(62).len(), 1);
    }

    #[test]
    fn all_attack_still_steals_when_no_alternative() {
        let mut p = pool(2);
        let slow_attack = AdsrParams {
            attack: 1.0,
            decay: 0.0,
            sustain: 1.0,
            release: 0.1,
        };
        p.allocate(60, 100, osc(60), slow_attack, None, Retrigger::Poly, StealPolicy::Steal);
        p.allocate(62, 100, osc(62), slow_attack, None, Retrigger::Poly, StealPolicy::Steal);
        let got = p.allocate(64, 100, osc(64), slow_attack, None, Retrigger::Poly, StealPolicy::Steal);
        assert!(got.is_some());
        assert_eq!(p.active_count(), 2);
    }

    #[test]
    fn deterministic_tie_break_lowest_slot() {
        let mut p = pool(4);
        // Four identical voices allocated in one batch: same band, same
        // amplitude, ages 1..4, same velocity — the oldest (slot 0) wins;
        // with identical ages the lowest slot index would.
        for note in [60, 62, 64, 65] {
            alloc(&mut p, note);
        }
        let victim = p.find_steal_candidate().unwrap();
        assert_eq!(victim, 0);
    }

    #[test]
    fn deny_policy_refuses_when_full() {
        let mut p = pool(2);
        alloc(&mut p, 60);
        alloc(&mut p, 62);
        let refused = p.allocate(
            64,
            100,
            osc(64),
            sustained(),
            None,
            Retrigger::Poly,
            StealPolicy::Deny,
        );
        assert!(refused.is_none());
        assert_eq!(p.denial_count(), 1);
        assert_eq!(p.active_count(), 2);
    }

    #[test]
    fn release_returns_after_exact_tail() {
        let mut p = pool(2);
        alloc(&mut p, 60);
        run_block(&mut p); // reach sustain

        p.release(60);
        // 0.3 s at 48 kHz = 14400 samples = 112.5 blocks -> 113 blocks.
        let expected_blocks = (0.3f32 * SR / BLOCK as f32).ceil() as usize;

        for _ in 0..expected_blocks - 1 {
            run_block(&mut p);
            assert_eq!(p.releasing_count(), 1, "returned too early");
        }
        run_block(&mut p);
        assert_eq!(p.releasing_count(), 0);
        assert_eq!(p.free_count(), 2);
    }

    #[test]
    fn release_produces_exactly_one_return() {
        let mut p = pool(2);
        alloc(&mut p, 60);
        run_block(&mut p);
        p.release(60);

        let mut returns = 0;
        let mut prev_free = p.free_count();
        for _ in 0..200 {
            run_block(&mut p);
            if p.free_count() > prev_free {
                returns += p.free_count() - prev_free;
                prev_free = p.free_count();
            }
        }
        assert_eq!(returns, 1);
    }

    #[test]
    fn released_voice_never_reappears_in_tracking() {
        let mut p = pool(2);
        let slot = alloc(&mut p, 60).unwrap();
        run_block(&mut p);
        p.release(60);
        for _ in 0..200 {
            run_block(&mut p);
        }
        assert_eq!(p.voice(slot).unwrap().state, VoiceState::Idle);
        for note in 0..128u8 {
            assert!(!p.bound(note).contains(&(slot as u8)));
        }
    }

    #[test]
    fn release_without_binding_is_logged_noop() {
        let mut p = pool(2);
        assert_eq!(p.release(60), 0);
        assert_eq!(p.invalid_release_count(), 1);
        assert_eq!(p.free_count(), 2);
    }

    #[test]
    fn double_release_is_noop_second_time() {
        let mut p = pool(2);
        alloc(&mut p, 60);
        run_block(&mut p);
        assert_eq!(p.release(60), 1);
        assert_eq!(p.release(60), 0);
        assert_eq!(p.invalid_release_count(), 1);
        assert_eq!(p.releasing_count(), 1);
    }

    #[test]
    fn mono_retrigger_keeps_one_voice() {
        let mut p = pool(4);
        p.allocate(60, 100, osc(60), sustained(), None, Retrigger::Mono, StealPolicy::Steal);
        p.allocate(60, 100, osc(60), sustained(), None, Retrigger::Mono, StealPolicy::Steal);
        assert_eq!(p.active_count(), 1);
        assert_eq!(p.bound(60).len(), 1);
        // No orphan left behind.
        assert_eq!(p.free_count(), 3);
    }

    #[test]
    fn poly_overlap_tracks_both_voices() {
        let mut p = pool(4);
        alloc(&mut p, 60);
        alloc(&mut p, 60);
        assert_eq!(p.active_count(), 2);
        assert_eq!(p.bound(60).len(), 2);

        // Each note-off releases exactly one voice, oldest first; the
        // second keeps sounding untouched.
        run_block(&mut p);
        assert_eq!(p.release(60), 1);
        assert_eq!(p.releasing_count(), 1);
        assert_eq!(p.active_count(), 1);

        assert_eq!(p.release(60), 1);
        assert_eq!(p.releasing_count(), 2);
        assert_eq!(p.active_count(), 0);
    }

    #[test]
    fn legato_retunes_without_new_voice() {
        let mut p = pool(4);
        p.allocate(60, 100, osc(60), sustained(), None, Retrigger::Legato, StealPolicy::Steal);
        run_block(&mut p);
        p.allocate(64, 100, osc(64), sustained(), None, Retrigger::Legato, StealPolicy::Steal);

        assert_eq!(p.active_count(), 1);
        assert!(p.bound(60).is_empty());
        assert_eq!(p.bound(64).len(), 1);
    }

    #[test]
    fn dispose_cancels_pending_returns() {
        let mut p = pool(4);
        alloc(&mut p, 60);
        alloc(&mut p, 62);
        run_block(&mut p);
        p.release(60);

        p.dispose();
        assert_eq!(p.active_count(), 0);
        assert_eq!(p.releasing_count(), 0);
        assert_eq!(p.free_count(), 4);

        // Countdown expiry after dispose must not fire a second return.
        for _ in 0..200 {
            p.advance_block();
        }
        assert_eq!(p.free_count(), 4);
    }

    #[test]
    fn finished_sample_voice_reaps_to_free() {
        let mut p = pool(2);
        let data = SampleData::mono(vec![0.3; 16]);
        p.allocate(
            60,
            100,
            VoiceSource::Slice {
                position: 0.0,
                rate: 1.0,
            },
            sustained(),
            None,
            Retrigger::Poly,
            StealPolicy::Steal,
        );
        let mut l = [0.0f32; BLOCK];
        let mut r = [0.0f32; BLOCK];
        p.render_into(Some(&data), &mut l, &mut r, 1.0);
        p.advance_block();
        assert_eq!(p.active_count(), 0);
        assert_eq!(p.free_count(), 2);
    }
}
