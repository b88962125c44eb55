//! Render-side queue of dispatch-ready events.
//!
//! Fixed capacity, sorted by absolute sample time. Insertion uses binary
//! search and removal shifts from the head; no operation allocates, so the
//! render context can own the queue outright.

use heapless::Vec as FixedVec;

use gk_ir::{ChannelId, InstrumentId, ParamId};

/// Maximum number of pending dispatch events.
pub const DISPATCH_CAPACITY: usize = 1024;

/// An event converted to absolute audio time, ready for the render context.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DispatchEvent {
    /// Absolute sample position at which the event takes effect.
    pub at_sample: u64,
    /// Scheduler generation that produced the event. The render context
    /// drops events stamped with a stale generation.
    pub generation: u32,
    pub action: DispatchAction,
}

/// What a dispatched event does.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DispatchAction {
    NoteOn {
        instrument: InstrumentId,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        instrument: InstrumentId,
        note: u8,
    },
    ClipStart {
        instrument: InstrumentId,
        clip: u16,
    },
    ChannelParam {
        channel: ChannelId,
        param: ParamId,
        target: f32,
        ramp_samples: u32,
    },
}

/// Time-sorted pending event queue.
#[derive(Debug, Default)]
pub struct DispatchQueue {
    events: FixedVec<DispatchEvent, DISPATCH_CAPACITY>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self {
            events: FixedVec::new(),
        }
    }

    /// Insert keeping time order. Events at the same sample keep their
    /// insertion order. Returns false when the queue is full.
    pub fn push(&mut self, event: DispatchEvent) -> bool {
        let pos = self
            .events
            .partition_point(|e| e.at_sample <= event.at_sample);
        self.events.insert(pos, event).is_ok()
    }

    /// Next pending event, if any.
    pub fn peek(&self) -> Option<&DispatchEvent> {
        self.events.first()
    }

    /// Pop the next event strictly before `horizon`.
    pub fn pop_due(&mut self, horizon: u64) -> Option<DispatchEvent> {
        if self.events.first()?.at_sample < horizon {
            Some(self.events.remove(0))
        } else {
            None
        }
    }

    /// Drop every queued event not stamped with `generation`.
    pub fn retain_generation(&mut self, generation: u32) {
        let mut i = 0;
        while i < self.events.len() {
            if self.events[i].generation != generation {
                self.events.remove(i);
            } else {
                i += 1;
            }
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
