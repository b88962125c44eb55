//! Look-ahead event scheduling.
//!
//! Control-context component: pulls timeline events inside a look-ahead
//! window, converts them to absolute sample times against the shared
//! clock, and hands them to the dispatch sink. Not realtime-safe; never
//! runs on the render thread.

use alloc::vec::Vec;

use gk_ir::{EventPayload, EventSource, EventTarget, PlaybackMode, Tick, TimelineEvent, BLOCK_SIZE};

use crate::clock::TimelineClock;
use crate::event_queue::{DispatchAction, DispatchEvent};

/// Look-ahead horizon in render blocks (~93 ms at 44.1 kHz / 128 frames).
pub const LOOKAHEAD_BLOCKS: u64 = 32;

/// Receives dispatch-ready events. Implemented by the engine's command
/// ring and by plain vectors in tests.
pub trait DispatchSink {
    /// Returns false when the event could not be accepted.
    fn send(&mut self, event: DispatchEvent) -> bool;
}

impl DispatchSink for Vec<DispatchEvent> {
    fn send(&mut self, event: DispatchEvent) -> bool {
        self.push(event);
        true
    }
}

/// Pulls arrangement events ahead of the playhead and dispatches them
/// with absolute sample timestamps.
pub struct EventScheduler {
    mode: PlaybackMode,
    generation: u32,
    /// High-water mark: every tick below this has already been dispatched.
    next_tick: Tick,
    /// Cached tick→sample conversion, re-read when the tempo epoch moves.
    samples_per_tick: f64,
    seen_tempo_epoch: u64,
    seen_wrap_epoch: u64,
    lookahead_samples: u64,
    scratch: Vec<TimelineEvent>,
}

impl EventScheduler {
    /// Create a scheduler starting at the clock's current position.
    pub fn new(mode: PlaybackMode, clock: &TimelineClock) -> Self {
        Self {
            mode,
            generation: 0,
            next_tick: clock.position_ticks(),
            samples_per_tick: clock.samples_per_tick(),
            seen_tempo_epoch: clock.tempo_epoch(),
            seen_wrap_epoch: clock.wrap_epoch(),
            lookahead_samples: LOOKAHEAD_BLOCKS * BLOCK_SIZE as u64,
            scratch: Vec::with_capacity(256),
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    /// Generation stamped onto dispatched events. Events carrying an older
    /// generation are dropped by the render context.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Switch playback mode mid-flight. Everything dispatched under the
    /// old mode is cancelled via the generation stamp; returns the new
    /// generation for the render context to adopt.
    pub fn set_mode(&mut self, mode: PlaybackMode, clock: &TimelineClock) -> u32 {
        self.mode = mode;
        self.generation = self.generation.wrapping_add(1);
        self.next_tick = clock.position_ticks();
        self.generation
    }

    /// Restart the window at an arbitrary tick (transport seek).
    pub fn seek(&mut self, tick: Tick) {
        self.next_tick = tick;
    }

    /// One scheduling tick: pull `[next_tick, horizon)` from the provider
    /// and dispatch. `alive` marks which instrument ids currently exist.
    /// Returns the number of events dispatched.
    pub fn run(
        &mut self,
        clock: &TimelineClock,
        source: &dyn EventSource,
        alive: &[bool],
        sink: &mut dyn DispatchSink,
    ) -> usize {
        let tempo_epoch = clock.tempo_epoch();
        if tempo_epoch != self.seen_tempo_epoch {
            self.seen_tempo_epoch = tempo_epoch;
            self.samples_per_tick = clock.samples_per_tick();
        }

        // A loop wrap rewinds the window to the loop start exactly once,
        // so overlapping pulls at the boundary never double-schedule.
        let wrap_epoch = clock.wrap_epoch();
        if wrap_epoch != self.seen_wrap_epoch {
            self.seen_wrap_epoch = wrap_epoch;
            self.next_tick = clock.loop_region().start as Tick;
        }

        let now = clock.position_samples();
        let horizon = ((now + self.lookahead_samples) as f64 / self.samples_per_tick) as Tick;
        let region = clock.loop_region();
        let window_end = if region.is_enabled() {
            horizon.min(region.end as Tick)
        } else {
            horizon
        };
        if window_end <= self.next_tick {
            return 0;
        }

        self.scratch.clear();
        source.events_in_range(self.mode, self.next_tick, window_end, &mut self.scratch);
        self.scratch.sort_by(|a, b| a.tick.cmp(&b.tick));

        let mut sent = 0;
        for i in 0..self.scratch.len() {
            let ev = self.scratch[i];
            let Some(action) = self.compile(&ev, alive) else {
                continue;
            };
            let dispatched = DispatchEvent {
                at_sample: (ev.tick as f64 * self.samples_per_tick) as u64,
                generation: self.generation,
                action,
            };
            if !sink.send(dispatched) {
                // Resume from the refused event on the next run.
                log::warn!("dispatch sink full, deferring events from tick {}", ev.tick);
                self.next_tick = ev.tick;
                return sent;
            }
            sent += 1;
        }

        self.next_tick = window_end;
        sent
    }

    /// Convert a timeline event into a dispatch action, validating its
    /// target. Events referencing a missing instrument are skipped and
    /// logged, never surfaced to the render path.
    fn compile(&self, ev: &TimelineEvent, alive: &[bool]) -> Option<DispatchAction> {
        let instrument_alive =
            |id: u16| -> bool { alive.get(id as usize).copied().unwrap_or(false) };

        match (ev.target, ev.payload) {
            (EventTarget::Instrument(id), EventPayload::NoteOn { note, velocity }) => {
                if !instrument_alive(id) {
                    log::warn!("skipping note-on for missing instrument {}", id);
                    return None;
                }
                Some(DispatchAction::NoteOn {
                    instrument: id,
                    note,
                    velocity,
                })
            }
            (EventTarget::Instrument(id), EventPayload::NoteOff { note }) => {
                if !instrument_alive(id) {
                    log::warn!("skipping note-off for missing instrument {}", id);
                    return None;
                }
                Some(DispatchAction::NoteOff {
                    instrument: id,
                    note,
                })
            }
            (EventTarget::Instrument(id), EventPayload::ClipTrigger { clip }) => {
                if !instrument_alive(id) {
                    log::warn!("skipping clip trigger for missing instrument {}", id);
                    return None;
                }
                Some(DispatchAction::ClipStart {
                    instrument: id,
                    clip,
                })
            }
            (
                EventTarget::Channel(channel),
                EventPayload::AutomationRamp {
                    param,
                    target,
                    duration,
                },
            ) => Some(DispatchAction::ChannelParam {
                channel,
                param,
                target,
                ramp_samples: (duration as f64 * self.samples_per_tick) as u32,
            }),
            (target, payload) => {
                log::warn!("event payload {:?} cannot route to {:?}", payload, target);
                None
            }
        }
    }
}
