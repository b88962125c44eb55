//! Mixer topology as plain data.
//!
//! This is what the persistence layer serializes: channel strips, insert
//! chains, and sends, with no runtime state attached. The engine builds a
//! live `MixerGraph` from it at construction time.

use alloc::vec::Vec;
use arrayvec::ArrayString;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Instrument identifier (index into the engine's instrument table).
pub type InstrumentId = u16;
/// Mixer channel identifier (index into [`MixerTopology::channels`]).
pub type ChannelId = u16;
/// Send bus identifier (index into [`MixerTopology::buses`]).
pub type BusId = u16;
/// Insert effect identifier, unique within its channel.
pub type EffectId = u16;
/// Automatable parameter identifier.
pub type ParamId = u16;

/// Channel gain automation target.
pub const PARAM_GAIN: ParamId = 0;
/// Channel pan automation target.
pub const PARAM_PAN: ParamId = 1;

/// Kind of insert effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EffectKind {
    Eq3,
    Compressor,
    Delay,
}

/// Control parameters for an insert effect.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EffectParams {
    Eq3 {
        low_gain_db: f32,
        mid_gain_db: f32,
        high_gain_db: f32,
        low_freq: f32,
        high_freq: f32,
    },
    Compressor {
        threshold_db: f32,
        ratio: f32,
    },
    Delay {
        time_ms: f32,
        feedback: f32,
        mix: f32,
    },
}

impl EffectParams {
    /// The effect kind these parameters belong to.
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectParams::Eq3 { .. } => EffectKind::Eq3,
            EffectParams::Compressor { .. } => EffectKind::Compressor,
            EffectParams::Delay { .. } => EffectKind::Delay,
        }
    }

    /// Default parameter set for a kind.
    pub fn default_for(kind: EffectKind) -> Self {
        match kind {
            EffectKind::Eq3 => EffectParams::Eq3 {
                low_gain_db: 0.0,
                mid_gain_db: 0.0,
                high_gain_db: 0.0,
                low_freq: 320.0,
                high_freq: 3200.0,
            },
            EffectKind::Compressor => EffectParams::Compressor {
                threshold_db: -12.0,
                ratio: 4.0,
            },
            EffectKind::Delay => EffectParams::Delay {
                time_ms: 250.0,
                feedback: 0.35,
                mix: 0.3,
            },
        }
    }
}

/// A persisted insert effect.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EffectDesc {
    pub params: EffectParams,
    pub bypassed: bool,
}

impl EffectDesc {
    pub fn new(params: EffectParams) -> Self {
        Self {
            params,
            bypassed: false,
        }
    }
}

/// A persisted send tap.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SendDesc {
    pub bus: BusId,
    pub level: f32,
    pub pre_fader: bool,
}

/// A persisted mixer channel.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelDesc {
    pub name: ArrayString<16>,
    pub gain: f32,
    /// -1.0 (hard left) to +1.0 (hard right)
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
    pub inserts: Vec<EffectDesc>,
    pub sends: Vec<SendDesc>,
}

impl ChannelDesc {
    /// Create a unity-gain, centered channel.
    pub fn new(name: &str) -> Self {
        let mut n = ArrayString::new();
        let _ = n.try_push_str(name);
        Self {
            name: n,
            gain: 1.0,
            pan: 0.0,
            mute: false,
            solo: false,
            inserts: Vec::new(),
            sends: Vec::new(),
        }
    }
}

/// A persisted send bus.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BusDesc {
    pub name: ArrayString<16>,
    pub gain: f32,
}

impl BusDesc {
    pub fn new(name: &str) -> Self {
        let mut n = ArrayString::new();
        let _ = n.try_push_str(name);
        Self { name: n, gain: 1.0 }
    }
}

/// The full mixer description.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MixerTopology {
    pub channels: Vec<ChannelDesc>,
    pub buses: Vec<BusDesc>,
    pub master_gain: f32,
}

impl MixerTopology {
    /// An empty mixer with unity master gain.
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            buses: Vec::new(),
            master_gain: 1.0,
        }
    }

    /// Add a channel, returning its id.
    pub fn add_channel(&mut self, desc: ChannelDesc) -> ChannelId {
        let id = self.channels.len() as ChannelId;
        self.channels.push(desc);
        id
    }

    /// Add a send bus, returning its id.
    pub fn add_bus(&mut self, desc: BusDesc) -> BusId {
        let id = self.buses.len() as BusId;
        self.buses.push(desc);
        id
    }
}

impl Default for MixerTopology {
    fn default() -> Self {
        Self::new()
    }
}
