//! Plain-data types for the groovekit playback engine.
//!
//! This crate defines the passive data the engine consumes: musical time
//! and tempo conversion, timeline events, the arrangement model the
//! scheduler pulls from, and the mixer topology the persistence layer
//! serializes. No runtime state lives here.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod arrangement;
mod audio_buffer;
mod event;
mod tempo;
mod tick;
mod topology;

pub use arrangement::{
    Arrangement, Clip, EventSource, NoteSpan, Pattern, PlaybackMode, RampSpan, TriggerSpan,
};
pub use audio_buffer::{AudioBuffer, BLOCK_SIZE};
pub use event::{EventPayload, EventTarget, TimelineEvent};
pub use tempo::{LoopRegion, TempoMap};
pub use tick::{pack_region, unpack_region, Tick, PPQ};
pub use topology::{
    BusDesc, BusId, ChannelDesc, ChannelId, EffectDesc, EffectId, EffectKind, EffectParams,
    InstrumentId, MixerTopology, ParamId, SendDesc, PARAM_GAIN, PARAM_PAN,
};
