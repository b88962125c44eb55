//! Timeline events pulled from the arrangement.

use crate::tick::Tick;
use crate::topology::{ChannelId, InstrumentId, ParamId};

/// A musical event with an absolute tick position.
///
/// Events are produced by the arrangement provider inside the scheduler's
/// look-ahead window and discarded after dispatch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimelineEvent {
    /// When the event sounds
    pub tick: Tick,
    /// Where the event is routed
    pub target: EventTarget,
    /// What the event does
    pub payload: EventPayload,
}

impl TimelineEvent {
    /// Create a new event.
    pub fn new(tick: Tick, target: EventTarget, payload: EventPayload) -> Self {
        Self {
            tick,
            target,
            payload,
        }
    }
}

/// Where an event is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventTarget {
    /// An instrument (notes, clip launches)
    Instrument(InstrumentId),
    /// A mixer channel (parameter automation)
    Channel(ChannelId),
}

/// What an event does.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EventPayload {
    /// Trigger a note
    NoteOn { note: u8, velocity: u8 },
    /// Release a note
    NoteOff { note: u8 },
    /// Ramp a channel parameter to a target value over `duration` ticks
    AutomationRamp {
        param: ParamId,
        target: f32,
        duration: Tick,
    },
    /// Launch a one-shot clip on an instrument
    ClipTrigger { clip: u16 },
}
