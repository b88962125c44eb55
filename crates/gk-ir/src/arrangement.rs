//! Arrangement model: patterns placed on a timeline as clips.
//!
//! The scheduler pulls events from this model through the read-only
//! [`EventSource`] trait; nothing here is touched by the render context.

use alloc::vec::Vec;

use crate::event::{EventPayload, EventTarget, TimelineEvent};
use crate::tick::Tick;
use crate::topology::{ChannelId, InstrumentId, ParamId};

/// A note within a pattern, positioned in pattern-local ticks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteSpan {
    /// Start tick relative to pattern start
    pub tick: Tick,
    /// Length in ticks
    pub duration: Tick,
    /// MIDI note number (0-127)
    pub note: u8,
    /// Velocity (1-127)
    pub velocity: u8,
}

/// An automation ramp within a pattern, targeting a mixer-channel parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RampSpan {
    /// Start tick relative to pattern start
    pub tick: Tick,
    /// Which channel the ramp automates
    pub channel: ChannelId,
    /// Which parameter
    pub param: ParamId,
    /// Target value
    pub target: f32,
    /// Ramp length in ticks
    pub duration: Tick,
}

/// A one-shot clip launch on an instrument.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriggerSpan {
    /// Absolute tick
    pub tick: Tick,
    /// Instrument that plays the clip
    pub instrument: InstrumentId,
    /// Clip identifier (opaque to the engine)
    pub clip: u16,
}

/// A reusable block of notes and automation.
#[derive(Clone, Debug, Default)]
pub struct Pattern {
    /// Pattern length in ticks
    pub length: Tick,
    pub notes: Vec<NoteSpan>,
    pub ramps: Vec<RampSpan>,
}

impl Pattern {
    /// Create an empty pattern of the given length.
    pub fn new(length: Tick) -> Self {
        Self {
            length,
            notes: Vec::new(),
            ramps: Vec::new(),
        }
    }
}

/// A pattern placed at an absolute position, bound to an instrument.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Clip {
    /// Index into [`Arrangement::patterns`]
    pub pattern: u16,
    /// Absolute start tick
    pub at: Tick,
    /// Instrument the clip's notes play on
    pub instrument: InstrumentId,
}

/// Which part of the arrangement the transport is playing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Loop a single pattern from tick 0 on one instrument.
    PatternLoop {
        pattern: u16,
        instrument: InstrumentId,
    },
    /// Play the full clip arrangement.
    Song,
}

/// Read-only event provider the scheduler pulls from.
pub trait EventSource {
    /// Append every event whose tick falls in `[start, end)` to `out`.
    fn events_in_range(
        &self,
        mode: PlaybackMode,
        start: Tick,
        end: Tick,
        out: &mut Vec<TimelineEvent>,
    );
}

/// The full arrangement: a pattern bank plus clip placements.
#[derive(Clone, Debug, Default)]
pub struct Arrangement {
    pub patterns: Vec<Pattern>,
    pub clips: Vec<Clip>,
    pub triggers: Vec<TriggerSpan>,
}

impl Arrangement {
    /// Create an empty arrangement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern, returning its index.
    pub fn add_pattern(&mut self, pattern: Pattern) -> u16 {
        let idx = self.patterns.len() as u16;
        self.patterns.push(pattern);
        idx
    }

    /// Place a clip on the timeline.
    pub fn add_clip(&mut self, clip: Clip) {
        self.clips.push(clip);
    }

    /// End tick of the last clip (0 for an empty arrangement).
    pub fn song_len(&self) -> Tick {
        self.clips
            .iter()
            .filter_map(|c| {
                self.patterns
                    .get(c.pattern as usize)
                    .map(|p| c.at + p.length)
            })
            .max()
            .unwrap_or(0)
    }

    /// Emit events from one pattern occurrence based at `base`.
    fn pull_pattern(
        &self,
        pattern: &Pattern,
        instrument: InstrumentId,
        base: Tick,
        start: Tick,
        end: Tick,
        out: &mut Vec<TimelineEvent>,
    ) {
        for n in &pattern.notes {
            let on = base + n.tick;
            if on >= start && on < end {
                out.push(TimelineEvent::new(
                    on,
                    EventTarget::Instrument(instrument),
                    EventPayload::NoteOn {
                        note: n.note,
                        velocity: n.velocity,
                    },
                ));
            }
            let off = on + n.duration;
            if off >= start && off < end {
                out.push(TimelineEvent::new(
                    off,
                    EventTarget::Instrument(instrument),
                    EventPayload::NoteOff { note: n.note },
                ));
            }
        }
        for r in &pattern.ramps {
            let at = base + r.tick;
            if at >= start && at < end {
                out.push(TimelineEvent::new(
                    at,
                    EventTarget::Channel(r.channel),
                    EventPayload::AutomationRamp {
                        param: r.param,
                        target: r.target,
                        duration: r.duration,
                    },
                ));
            }
        }
    }
}

impl EventSource for Arrangement {
    fn events_in_range(
        &self,
        mode: PlaybackMode,
        start: Tick,
        end: Tick,
        out: &mut Vec<TimelineEvent>,
    ) {
        match mode {
            PlaybackMode::PatternLoop {
                pattern,
                instrument,
            } => {
                if let Some(p) = self.patterns.get(pattern as usize) {
                    self.pull_pattern(p, instrument, 0, start, end, out);
                }
            }
            PlaybackMode::Song => {
                for clip in &self.clips {
                    let Some(p) = self.patterns.get(clip.pattern as usize) else {
                        continue;
                    };
                    // Clip can't contribute past its own extent; note-off
                    // ticks may trail the pattern end by a note's duration.
                    if clip.at >= end {
                        continue;
                    }
                    self.pull_pattern(p, clip.instrument, clip.at, start, end, out);
                }
                for t in &self.triggers {
                    if t.tick >= start && t.tick < end {
                        out.push(TimelineEvent::new(
                            t.tick,
                            EventTarget::Instrument(t.instrument),
                            EventPayload::ClipTrigger { clip: t.clip },
                        ));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_note_pattern(tick: Tick, duration: Tick, note: u8) -> Pattern {
        let mut p = Pattern::new(384);
        p.notes.push(NoteSpan {
            tick,
            duration,
            note,
            velocity: 100,
        });
        p
    }

    fn song_with(pattern: Pattern, at: Tick) -> Arrangement {
        let mut arr = Arrangement::new();
        let idx = arr.add_pattern(pattern);
        arr.add_clip(Clip {
            pattern: idx,
            at,
            instrument: 0,
        });
        arr
    }

    fn pull(arr: &Arrangement, mode: PlaybackMode, start: Tick, end: Tick) -> Vec<TimelineEvent> {
        let mut out = Vec::new();
        arr.events_in_range(mode, start, end, &mut out);
        out
    }

    #[test]
    fn empty_arrangement_produces_nothing() {
        let arr = Arrangement::new();
        assert!(pull(&arr, PlaybackMode::Song, 0, 10_000).is_empty());
    }

    #[test]
    fn note_on_and_off_both_emitted() {
        let arr = song_with(one_note_pattern(0, 96, 60), 0);
        let events = pull(&arr, PlaybackMode::Song, 0, 384);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].tick, 0);
        assert_eq!(
            events[0].payload,
            EventPayload::NoteOn {
                note: 60,
                velocity: 100
            }
        );
        assert_eq!(events[1].tick, 96);
        assert_eq!(events[1].payload, EventPayload::NoteOff { note: 60 });
    }

    #[test]
    fn window_is_half_open() {
        let arr = song_with(one_note_pattern(96, 48, 60), 0);
        // Note-on at 96 excluded from [0, 96), included in [96, 192)
        assert!(pull(&arr, PlaybackMode::Song, 0, 96).is_empty());
        let events = pull(&arr, PlaybackMode::Song, 96, 192);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn off_emitted_in_later_window_than_on() {
        let arr = song_with(one_note_pattern(0, 200, 64), 0);
        let first = pull(&arr, PlaybackMode::Song, 0, 100);
        assert_eq!(first.len(), 1);
        assert!(matches!(first[0].payload, EventPayload::NoteOn { .. }));
        let second = pull(&arr, PlaybackMode::Song, 100, 300);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].payload, EventPayload::NoteOff { note: 64 });
    }

    #[test]
    fn clip_offset_shifts_ticks() {
        let arr = song_with(one_note_pattern(10, 20, 72), 500);
        let events = pull(&arr, PlaybackMode::Song, 500, 600);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].tick, 510);
        assert_eq!(events[1].tick, 530);
    }

    #[test]
    fn pattern_loop_ignores_clips() {
        let mut arr = song_with(one_note_pattern(0, 48, 60), 768);
        let solo = arr.add_pattern(one_note_pattern(24, 24, 67));
        let events = pull(
            &arr,
            PlaybackMode::PatternLoop {
                pattern: solo,
                instrument: 3,
            },
            0,
            384,
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].tick, 24);
        assert_eq!(events[0].target, EventTarget::Instrument(3));
    }

    #[test]
    fn ramps_route_to_channel() {
        let mut p = Pattern::new(384);
        p.ramps.push(RampSpan {
            tick: 48,
            channel: 2,
            param: crate::topology::PARAM_GAIN,
            target: 0.5,
            duration: 96,
        });
        let arr = song_with(p, 0);
        let events = pull(&arr, PlaybackMode::Song, 0, 384);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target, EventTarget::Channel(2));
    }

    #[test]
    fn triggers_emitted_in_song_mode_only() {
        let mut arr = Arrangement::new();
        arr.triggers.push(TriggerSpan {
            tick: 100,
            instrument: 1,
            clip: 7,
        });
        let in_song = pull(&arr, PlaybackMode::Song, 0, 200);
        assert_eq!(in_song.len(), 1);
        assert_eq!(in_song[0].payload, EventPayload::ClipTrigger { clip: 7 });

        let idx = arr.add_pattern(Pattern::new(384));
        let in_loop = pull(
            &arr,
            PlaybackMode::PatternLoop {
                pattern: idx,
                instrument: 0,
            },
            0,
            200,
        );
        assert!(in_loop.is_empty());
    }

    #[test]
    fn song_len_covers_last_clip() {
        let arr = song_with(one_note_pattern(0, 48, 60), 768);
        assert_eq!(arr.song_len(), 768 + 384);
    }
}
