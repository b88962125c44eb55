//! Block renderer: the render-context owner.
//!
//! Everything here runs on the audio thread under its deadline: no
//! allocation, no locks, no logging. Failures degrade to silence or
//! no-ops and are surfaced through atomic counters that the control
//! context polls and logs.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use gk_ir::{InstrumentId, Tick};

use crate::clock::TimelineClock;
use crate::event_queue::{DispatchAction, DispatchEvent, DispatchQueue};
use crate::frame::Frame;
use crate::instrument::Instrument;
use crate::mixer::{ChannelKey, MixerGraph};

/// Counters shared across the render boundary. The render context only
/// stores; the control context reads and logs.
#[derive(Debug, Default)]
pub struct RenderStats {
    /// Events that arrived with a timestamp already in the past and were
    /// clamped to the next block boundary.
    pub late_events: AtomicU64,
    /// Events refused because the pending queue was full.
    pub dropped_events: AtomicU64,
    /// Events discarded because their scheduler generation was stale.
    pub stale_events: AtomicU64,
    /// Allocations denied by a full pool under a Deny policy.
    pub denied_allocations: AtomicU64,
    /// Releases that found no bound voice.
    pub invalid_releases: AtomicU64,
}

impl RenderStats {
    pub fn late(&self) -> u64 {
        self.late_events.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn stale(&self) -> u64 {
        self.stale_events.load(Ordering::Relaxed)
    }

    pub fn denied(&self) -> u64 {
        self.denied_allocations.load(Ordering::Relaxed)
    }

    pub fn invalid(&self) -> u64 {
        self.invalid_releases.load(Ordering::Relaxed)
    }
}

/// Control→render commands. Everything crossing the boundary is `Copy`
/// and travels through a pre-sized SPSC ring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EngineCommand {
    Dispatch(DispatchEvent),
    /// Adopt a new scheduler generation; pending events from older
    /// generations are cancelled.
    SetGeneration(u32),
    Play,
    Pause,
    /// Stop: silence everything, cancel pending voice returns, rewind.
    Stop,
    SeekSamples(u64),
    DisposeInstrument(InstrumentId),
}

/// Owns the per-block render path.
pub struct Renderer {
    clock: TimelineClock,
    queue: DispatchQueue,
    instruments: Vec<Option<Instrument>>,
    /// Topology-order channel keys; instruments address channels by id.
    channel_keys: Vec<ChannelKey>,
    mixer: MixerGraph,
    generation: u32,
    playing: bool,
    stats: Arc<RenderStats>,
}

impl Renderer {
    pub fn new(
        clock: TimelineClock,
        mixer: MixerGraph,
        channel_keys: Vec<ChannelKey>,
        instruments: Vec<Instrument>,
    ) -> Self {
        Self {
            clock,
            queue: DispatchQueue::new(),
            instruments: instruments.into_iter().map(Some).collect(),
            channel_keys,
            mixer,
            generation: 0,
            playing: false,
            stats: Arc::new(RenderStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<RenderStats> {
        Arc::clone(&self.stats)
    }

    pub fn clock(&self) -> &TimelineClock {
        &self.clock
    }

    pub fn mixer(&self) -> &MixerGraph {
        &self.mixer
    }

    pub fn mixer_mut(&mut self) -> &mut MixerGraph {
        &mut self.mixer
    }

    pub fn instrument(&self, id: InstrumentId) -> Option<&Instrument> {
        self.instruments.get(id as usize)?.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn position_ticks(&self) -> Tick {
        self.clock.position_ticks()
    }

    /// Apply one command from the control context.
    pub fn command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Dispatch(event) => {
                if event.generation != self.generation {
                    self.stats.stale_events.fetch_add(1, Ordering::Relaxed);
                } else if !self.queue.push(event) {
                    self.stats.dropped_events.fetch_add(1, Ordering::Relaxed);
                }
            }
            EngineCommand::SetGeneration(generation) => {
                self.generation = generation;
                self.queue.retain_generation(generation);
            }
            EngineCommand::Play => {
                self.playing = true;
            }
            EngineCommand::Pause => {
                self.playing = false;
            }
            EngineCommand::Stop => {
                self.playing = false;
                self.queue.clear();
                for inst in self.instruments.iter_mut().flatten() {
                    inst.dispose();
                }
                self.clock.seek_samples(0);
            }
            EngineCommand::SeekSamples(samples) => {
                self.queue.clear();
                for inst in self.instruments.iter_mut().flatten() {
                    inst.dispose();
                }
                self.clock.seek_samples(samples);
            }
            EngineCommand::DisposeInstrument(id) => {
                if let Some(slot) = self.instruments.get_mut(id as usize) {
                    if let Some(inst) = slot.as_mut() {
                        inst.dispose();
                    }
                    *slot = None;
                }
            }
        }
    }

    /// Render one block of frames.
    pub fn render_block(&mut self, out: &mut [Frame]) {
        #[cfg(feature = "alloc_check")]
        assert_no_alloc::assert_no_alloc(|| self.render_block_inner(out));
        #[cfg(not(feature = "alloc_check"))]
        self.render_block_inner(out);
    }

    fn render_block_inner(&mut self, out: &mut [Frame]) {
        let frames = out.len();
        if !self.playing {
            out.fill(Frame::silence());
            return;
        }

        self.mixer.begin_block();

        let start = self.clock.position_samples();
        let end = start + frames as u64;
        let mut cursor = 0usize;

        // Execute due events in time order, rendering the audio between
        // consecutive event offsets so each lands sample-accurately.
        while let Some(event) = self.queue.pop_due(end) {
            if event.generation != self.generation {
                self.stats.stale_events.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let offset = if event.at_sample < start {
                // Late event: clamp to the next safe boundary instead of
                // dropping it; the control side logs the counter.
                self.stats.late_events.fetch_add(1, Ordering::Relaxed);
                cursor
            } else {
                ((event.at_sample - start) as usize).clamp(cursor, frames)
            };

            if offset > cursor {
                self.render_span(cursor, offset);
                cursor = offset;
            }
            self.apply_event(event);
        }

        if cursor < frames {
            self.render_span(cursor, frames);
        }

        self.mixer.process_block(frames);
        let (master_l, master_r) = self.mixer.master();
        for (i, frame) in out.iter_mut().enumerate() {
            *frame = Frame::new(master_l[i], master_r[i]).clamped();
        }

        let mut denied = 0;
        let mut invalid = 0;
        for inst in self.instruments.iter_mut().flatten() {
            inst.finish_block();
            denied += inst.pool().denial_count();
            invalid += inst.pool().invalid_release_count();
        }
        self.stats.denied_allocations.store(denied, Ordering::Relaxed);
        self.stats.invalid_releases.store(invalid, Ordering::Relaxed);

        self.clock.advance(frames as u64);
    }

    /// Render all instruments into their channels for `[from, to)`.
    fn render_span(&mut self, from: usize, to: usize) {
        for idx in 0..self.instruments.len() {
            let Some(inst) = self.instruments[idx].as_mut() else {
                continue;
            };
            let channel = inst.params().channel as usize;
            let Some(&key) = self.channel_keys.get(channel) else {
                continue;
            };
            let Some((l, r)) = self.mixer.input_mut(key) else {
                continue;
            };
            inst.render(&mut l[from..to], &mut r[from..to]);
        }
    }

    fn apply_event(&mut self, event: DispatchEvent) {
        match event.action {
            DispatchAction::NoteOn {
                instrument,
                note,
                velocity,
            } => {
                if let Some(Some(inst)) = self.instruments.get_mut(instrument as usize) {
                    inst.note_on(note, velocity);
                }
            }
            DispatchAction::NoteOff { instrument, note } => {
                if let Some(Some(inst)) = self.instruments.get_mut(instrument as usize) {
                    inst.note_off(note);
                }
            }
            DispatchAction::ClipStart { instrument, clip } => {
                if let Some(Some(inst)) = self.instruments.get_mut(instrument as usize) {
                    inst.trigger_clip(clip);
                }
            }
            DispatchAction::ChannelParam {
                channel,
                param,
                target,
                ramp_samples,
            } => {
                if let Some(&key) = self.channel_keys.get(channel as usize) {
                    self.mixer.apply_param(key, param, target, ramp_samples);
                }
            }
        }
    }
}
