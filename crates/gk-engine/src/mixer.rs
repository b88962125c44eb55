//! Mixer graph: channel strips, insert chains, sends, master bus.
//!
//! Each strip's insert chain is held as an explicit edge list from its
//! input port through the active effects to its output port. Bypass and
//! removal splice only the edges adjacent to the affected node — the rest
//! of the wiring is never torn down, which keeps toggles click-free and
//! safe under concurrent parameter automation.

use alloc::vec::Vec;

use gk_ir::{
    AudioBuffer, BusId, ChannelDesc, EffectId, EffectParams, MixerTopology, ParamId, PARAM_GAIN,
    PARAM_PAN,
};
use slotmap::{new_key_type, SlotMap};

use crate::effect::EffectInstance;

new_key_type! {
    /// Stable key for a mixer channel.
    pub struct ChannelKey;
}

/// A wiring endpoint in a channel's insert chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Port {
    Input,
    Effect(EffectId),
    Output,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Send {
    bus: BusId,
    level: f32,
    pre_fader: bool,
}

/// Linear parameter ramp state.
#[derive(Clone, Copy, Debug)]
struct Ramp {
    target: f32,
    step: f32,
    remaining: u32,
}

impl Ramp {
    fn new(current: f32, target: f32, samples: u32) -> Self {
        let samples = samples.max(1);
        Self {
            target,
            step: (target - current) / samples as f32,
            remaining: samples,
        }
    }

    /// Advance by `frames`; returns the new value and whether it finished.
    fn advance(&mut self, current: f32, frames: u32) -> (f32, bool) {
        let n = frames.min(self.remaining);
        self.remaining -= n;
        if self.remaining == 0 {
            (self.target, true)
        } else {
            (current + self.step * n as f32, false)
        }
    }
}

/// One live mixer channel.
pub struct ChannelStrip {
    pub gain: f32,
    /// -1.0 (hard left) to +1.0 (hard right)
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
    effects: Vec<EffectInstance>,
    edges: Vec<(Port, Port)>,
    sends: Vec<Send>,
    next_effect_id: EffectId,
    gain_ramp: Option<Ramp>,
    pan_ramp: Option<Ramp>,
    /// Cached constant-power pan coefficients.
    applied_pan: f32,
    pan_l: f32,
    pan_r: f32,
    buffer: AudioBuffer,
    peak_l: f32,
    peak_r: f32,
}

impl ChannelStrip {
    fn new(gain: f32, pan: f32) -> Self {
        let mut strip = Self {
            gain,
            pan,
            mute: false,
            solo: false,
            effects: Vec::with_capacity(8),
            edges: Vec::with_capacity(16),
            sends: Vec::with_capacity(4),
            next_effect_id: 0,
            gain_ramp: None,
            pan_ramp: None,
            applied_pan: 0.0,
            pan_l: 1.0,
            pan_r: 1.0,
            buffer: AudioBuffer::stereo_block(),
            peak_l: 0.0,
            peak_r: 0.0,
        };
        strip.edges.push((Port::Input, Port::Output));
        strip.recompute_pan();
        strip
    }

    fn from_desc(desc: &ChannelDesc, sample_rate: f32) -> Self {
        let mut strip = Self::new(desc.gain, desc.pan);
        strip.mute = desc.mute;
        strip.solo = desc.solo;
        for insert in &desc.inserts {
            strip.add_effect(&insert.params, sample_rate, insert.bypassed);
        }
        for send in &desc.sends {
            strip.sends.push(Send {
                bus: send.bus,
                level: send.level,
                pre_fader: send.pre_fader,
            });
        }
        strip
    }

    /// Append an effect at the end of the chain.
    fn add_effect(&mut self, params: &EffectParams, sample_rate: f32, bypassed: bool) -> EffectId {
        let id = self.next_effect_id;
        self.next_effect_id += 1;

        let mut fx = EffectInstance::new(id, params, sample_rate);
        fx.bypassed = bypassed;
        if !bypassed {
            let idx = self
                .edges
                .iter()
                .position(|(_, t)| *t == Port::Output)
                .expect("chain always terminates at Output");
            let (pred, _) = self.edges[idx];
            self.edges[idx] = (pred, Port::Effect(id));
            self.edges.push((Port::Effect(id), Port::Output));
        }
        self.effects.push(fx);
        id
    }

    /// Splice the node out of the chain: its two adjacent edges collapse
    /// into one predecessor→successor edge.
    fn unwire(&mut self, id: EffectId) {
        let node = Port::Effect(id);
        let Some(pe) = self.edges.iter().position(|(_, t)| *t == node) else {
            return;
        };
        let (pred, _) = self.edges[pe];
        let Some(se) = self.edges.iter().position(|(f, _)| *f == node) else {
            return;
        };
        let (_, succ) = self.edges[se];

        let (hi, lo) = if pe > se { (pe, se) } else { (se, pe) };
        self.edges.remove(hi);
        self.edges.remove(lo);
        self.edges.push((pred, succ));
    }

    fn remove_effect(&mut self, id: EffectId) -> bool {
        let Some(pos) = self.effects.iter().position(|e| e.id == id) else {
            return false;
        };
        if !self.effects[pos].bypassed {
            self.unwire(id);
        }
        self.effects.remove(pos);
        true
    }

    fn set_bypass(&mut self, id: EffectId, bypassed: bool) -> bool {
        let Some(pos) = self.effects.iter().position(|e| e.id == id) else {
            return false;
        };
        if self.effects[pos].bypassed == bypassed {
            return true;
        }

        if bypassed {
            self.unwire(id);
            self.effects[pos].bypassed = true;
        } else {
            // Re-enter between the nearest non-bypassed logical neighbors.
            let pred = self.effects[..pos]
                .iter()
                .rev()
                .find(|e| !e.bypassed)
                .map(|e| Port::Effect(e.id))
                .unwrap_or(Port::Input);
            let succ = self.effects[pos + 1..]
                .iter()
                .find(|e| !e.bypassed)
                .map(|e| Port::Effect(e.id))
                .unwrap_or(Port::Output);

            if let Some(i) = self
                .edges
                .iter()
                .position(|&(f, t)| f == pred && t == succ)
            {
                self.edges.remove(i);
            }
            self.edges.push((pred, Port::Effect(id)));
            self.edges.push((Port::Effect(id), succ));

            self.effects[pos].bypassed = false;
            self.effects[pos].reset_state();
        }
        true
    }

    fn set_effect_params(&mut self, id: EffectId, params: &EffectParams) -> bool {
        match self.effects.iter_mut().find(|e| e.id == id) {
            Some(fx) => {
                fx.set_params(params);
                true
            }
            None => false,
        }
    }

    /// Current wiring, for inspection and tests.
    pub fn edges(&self) -> &[(Port, Port)] {
        &self.edges
    }

    pub fn effect_ids(&self) -> impl Iterator<Item = EffectId> + '_ {
        self.effects.iter().map(|e| e.id)
    }

    pub fn effect(&self, id: EffectId) -> Option<&EffectInstance> {
        self.effects.iter().find(|e| e.id == id)
    }

    pub fn peaks(&self) -> (f32, f32) {
        (self.peak_l, self.peak_r)
    }

    fn set_param(&mut self, param: ParamId, target: f32, ramp_samples: u32) {
        match param {
            PARAM_GAIN => {
                if ramp_samples == 0 {
                    self.gain = target;
                    self.gain_ramp = None;
                } else {
                    self.gain_ramp = Some(Ramp::new(self.gain, target, ramp_samples));
                }
            }
            PARAM_PAN => {
                if ramp_samples == 0 {
                    self.pan = target;
                    self.pan_ramp = None;
                } else {
                    self.pan_ramp = Some(Ramp::new(self.pan, target, ramp_samples));
                }
            }
            other => {
                log::warn!("automation for unknown parameter {}", other);
            }
        }
    }

    fn advance_ramps(&mut self, frames: u32) {
        if let Some(mut ramp) = self.gain_ramp.take() {
            let (value, done) = ramp.advance(self.gain, frames);
            self.gain = value;
            if !done {
                self.gain_ramp = Some(ramp);
            }
        }
        if let Some(mut ramp) = self.pan_ramp.take() {
            let (value, done) = ramp.advance(self.pan, frames);
            self.pan = value;
            if !done {
                self.pan_ramp = Some(ramp);
            }
        }
    }

    /// Recompute constant-power pan gains when the pan position changed.
    fn ensure_pan(&mut self) {
        if self.pan != self.applied_pan {
            self.applied_pan = self.pan;
            self.recompute_pan();
        }
    }

    fn recompute_pan(&mut self) {
        let p = self.applied_pan.clamp(-1.0, 1.0);
        let angle = (p + 1.0) * core::f32::consts::FRAC_PI_4;
        self.pan_l = libm::cosf(angle);
        self.pan_r = libm::sinf(angle);
    }

    /// Walk the edge list from Input and run each wired effect in place.
    fn run_inserts(&mut self, frames: usize) {
        let mut port = Port::Input;
        loop {
            let Some(next) = self
                .edges
                .iter()
                .find(|(f, _)| *f == port)
                .map(|(_, t)| *t)
            else {
                break;
            };
            match next {
                Port::Output | Port::Input => break,
                Port::Effect(id) => {
                    let (l, r) = self.buffer.stereo_mut();
                    if let Some(fx) = self.effects.iter_mut().find(|e| e.id == id) {
                        fx.process_block(&mut l[..frames], &mut r[..frames]);
                    }
                    port = next;
                }
            }
        }
    }

    /// Apply gain and pan in place, then capture peak levels.
    fn apply_fader(&mut self, frames: usize) {
        self.ensure_pan();
        let gain = self.gain;
        let centered = self.applied_pan == 0.0;
        let (pan_l, pan_r) = (self.pan_l, self.pan_r);

        let (l, r) = self.buffer.stereo_mut();
        if centered {
            for i in 0..frames {
                l[i] *= gain;
                r[i] *= gain;
            }
        } else {
            for i in 0..frames {
                let mono = (l[i] + r[i]) * 0.5 * gain;
                l[i] = mono * pan_l;
                r[i] = mono * pan_r;
            }
        }

        self.peak_l = self.buffer.peak(0);
        self.peak_r = self.buffer.peak(1);
    }
}

/// A send bus: accumulates taps, returns to master with its own gain.
pub struct BusStrip {
    pub gain: f32,
    buffer: AudioBuffer,
}

/// The full live mixer.
pub struct MixerGraph {
    channels: SlotMap<ChannelKey, ChannelStrip>,
    buses: Vec<BusStrip>,
    master: AudioBuffer,
    pub master_gain: f32,
    sample_rate: f32,
}

impl MixerGraph {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            channels: SlotMap::with_key(),
            buses: Vec::new(),
            master: AudioBuffer::stereo_block(),
            master_gain: 1.0,
            sample_rate,
        }
    }

    /// Build a live mixer from a topology description. Returns the graph
    /// plus the channel-id→key mapping in topology order.
    pub fn from_topology(topology: &MixerTopology, sample_rate: f32) -> (Self, Vec<ChannelKey>) {
        let mut graph = Self::new(sample_rate);
        graph.master_gain = topology.master_gain;
        for bus in &topology.buses {
            graph.buses.push(BusStrip {
                gain: bus.gain,
                buffer: AudioBuffer::stereo_block(),
            });
        }
        let keys = topology
            .channels
            .iter()
            .map(|desc| graph.channels.insert(ChannelStrip::from_desc(desc, sample_rate)))
            .collect();
        (graph, keys)
    }

    pub fn add_channel(&mut self, desc: &ChannelDesc) -> ChannelKey {
        self.channels
            .insert(ChannelStrip::from_desc(desc, self.sample_rate))
    }

    pub fn remove_channel(&mut self, key: ChannelKey) -> bool {
        self.channels.remove(key).is_some()
    }

    pub fn channel(&self, key: ChannelKey) -> Option<&ChannelStrip> {
        self.channels.get(key)
    }

    pub fn channel_mut(&mut self, key: ChannelKey) -> Option<&mut ChannelStrip> {
        self.channels.get_mut(key)
    }

    /// Append an effect to a channel's chain. A missing channel is a
    /// logged no-op returning None.
    pub fn add_effect(&mut self, key: ChannelKey, params: &EffectParams) -> Option<EffectId> {
        let sample_rate = self.sample_rate;
        match self.channels.get_mut(key) {
            Some(strip) => Some(strip.add_effect(params, sample_rate, false)),
            None => {
                log::warn!("add_effect on removed channel");
                None
            }
        }
    }

    pub fn remove_effect(&mut self, key: ChannelKey, id: EffectId) -> bool {
        match self.channels.get_mut(key) {
            Some(strip) => strip.remove_effect(id),
            None => {
                log::warn!("remove_effect on removed channel");
                false
            }
        }
    }

    /// Toggle bypass by rewiring only the node's adjacent edges.
    pub fn set_bypass(&mut self, key: ChannelKey, id: EffectId, bypassed: bool) -> bool {
        match self.channels.get_mut(key) {
            Some(strip) => strip.set_bypass(id, bypassed),
            None => {
                log::warn!("set_bypass on removed channel");
                false
            }
        }
    }

    pub fn set_effect_params(&mut self, key: ChannelKey, id: EffectId, params: &EffectParams) -> bool {
        match self.channels.get_mut(key) {
            Some(strip) => strip.set_effect_params(id, params),
            None => false,
        }
    }

    /// Attach a send tap without disturbing the insert chain.
    pub fn connect_send(&mut self, key: ChannelKey, bus: BusId, level: f32, pre_fader: bool) -> bool {
        if bus as usize >= self.buses.len() {
            log::warn!("connect_send to unknown bus {}", bus);
            return false;
        }
        match self.channels.get_mut(key) {
            Some(strip) => {
                strip.sends.push(Send {
                    bus,
                    level,
                    pre_fader,
                });
                true
            }
            None => {
                log::warn!("connect_send on removed channel");
                false
            }
        }
    }

    /// Stage a channel parameter change (automation dispatch target).
    pub fn apply_param(&mut self, key: ChannelKey, param: ParamId, target: f32, ramp_samples: u32) {
        match self.channels.get_mut(key) {
            Some(strip) => strip.set_param(param, target, ramp_samples),
            None => log::warn!("automation for removed channel"),
        }
    }

    /// Zero all channel input buffers; call at block start before voices
    /// render in.
    pub fn begin_block(&mut self) {
        for strip in self.channels.values_mut() {
            strip.buffer.silence();
        }
    }

    /// The channel's input buffer for this block.
    pub fn input_mut(&mut self, key: ChannelKey) -> Option<(&mut [f32], &mut [f32])> {
        self.channels.get_mut(key).map(|s| s.buffer.stereo_mut())
    }

    /// Process all strips and sum into the master bus.
    pub fn process_block(&mut self, frames: usize) {
        self.master.silence();
        for bus in &mut self.buses {
            bus.buffer.silence();
        }

        let any_solo = self.channels.values().any(|s| s.solo);

        for strip in self.channels.values_mut() {
            strip.advance_ramps(frames as u32);

            let audible = !strip.mute && (!any_solo || strip.solo);
            if !audible {
                strip.buffer.silence();
                strip.peak_l = 0.0;
                strip.peak_r = 0.0;
                continue;
            }

            strip.run_inserts(frames);

            for send in &strip.sends {
                if send.pre_fader {
                    if let Some(bus) = self.buses.get_mut(send.bus as usize) {
                        bus.buffer.mix_from_scaled(&strip.buffer, send.level);
                    }
                }
            }

            strip.apply_fader(frames);

            for send in &strip.sends {
                if !send.pre_fader {
                    if let Some(bus) = self.buses.get_mut(send.bus as usize) {
                        bus.buffer.mix_from_scaled(&strip.buffer, send.level);
                    }
                }
            }

            self.master.mix_from_scaled(&strip.buffer, 1.0);
        }

        let master = &mut self.master;
        for bus in &mut self.buses {
            master.mix_from_scaled(&bus.buffer, bus.gain);
        }
        master.apply_gain(self.master_gain);
    }

    /// Master output planes for the current block.
    pub fn master(&self) -> (&[f32], &[f32]) {
        (self.master.channel(0), self.master.channel(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gk_ir::{BusDesc, EffectKind, SendDesc, BLOCK_SIZE};

    const SR: f32 = 44_100.0;

    fn graph_one_channel() -> (MixerGraph, ChannelKey) {
        let mut topo = MixerTopology::new();
        topo.add_channel(ChannelDesc::new("ch"));
        let (graph, keys) = MixerGraph::from_topology(&topo, SR);
        (graph, keys[0])
    }

    fn edge_set(strip: &ChannelStrip) -> Vec<(Port, Port)> {
        let mut v = strip.edges().to_vec();
        v.sort_by_key(|&(f, t)| (port_rank(f), port_rank(t)));
        v
    }

    fn port_rank(p: Port) -> u32 {
        match p {
            Port::Input => 0,
            Port::Effect(id) => 1 + id as u32,
            Port::Output => u32::MAX,
        }
    }

    #[test]
    fn empty_chain_is_input_to_output() {
        let (graph, key) = graph_one_channel();
        assert_eq!(
            graph.channel(key).unwrap().edges(),
            &[(Port::Input, Port::Output)]
        );
    }

    #[test]
    fn add_effect_splices_before_output() {
        let (mut graph, key) = graph_one_channel();
        let a = graph
            .add_effect(key, &EffectParams::default_for(EffectKind::Eq3))
            .unwrap();
        let b = graph
            .add_effect(key, &EffectParams::default_for(EffectKind::Delay))
            .unwrap();

        let edges = edge_set(graph.channel(key).unwrap());
        assert_eq!(
            edges,
            vec![
                (Port::Input, Port::Effect(a)),
                (Port::Effect(a), Port::Effect(b)),
                (Port::Effect(b), Port::Output),
            ]
        );
    }

    #[test]
    fn bypass_changes_only_two_adjacent_edges() {
        let (mut graph, key) = graph_one_channel();
        let a = graph
            .add_effect(key, &EffectParams::default_for(EffectKind::Eq3))
            .unwrap();
        let b = graph
            .add_effect(key, &EffectParams::default_for(EffectKind::Compressor))
            .unwrap();
        let c = graph
            .add_effect(key, &EffectParams::default_for(EffectKind::Delay))
            .unwrap();

        let before = edge_set(graph.channel(key).unwrap());
        assert!(graph.set_bypass(key, b, true));
        let after = edge_set(graph.channel(key).unwrap());

        let removed: Vec<_> = before.iter().filter(|e| !after.contains(e)).collect();
        let added: Vec<_> = after.iter().filter(|e| !before.contains(e)).collect();

        assert_eq!(
            removed,
            vec![
                &(Port::Effect(a), Port::Effect(b)),
                &(Port::Effect(b), Port::Effect(c)),
            ]
        );
        assert_eq!(added, vec![&(Port::Effect(a), Port::Effect(c))]);
    }

    #[test]
    fn unbypass_restores_chain_position() {
        let (mut graph, key) = graph_one_channel();
        let a = graph
            .add_effect(key, &EffectParams::default_for(EffectKind::Eq3))
            .unwrap();
        let b = graph
            .add_effect(key, &EffectParams::default_for(EffectKind::Compressor))
            .unwrap();
        let c = graph
            .add_effect(key, &EffectParams::default_for(EffectKind::Delay))
            .unwrap();

        let original = edge_set(graph.channel(key).unwrap());
        graph.set_bypass(key, b, true);
        graph.set_bypass(key, b, false);
        assert_eq!(edge_set(graph.channel(key).unwrap()), original);
        let _ = (a, c);
    }

    #[test]
    fn remove_middle_effect_splices_neighbors() {
        let (mut graph, key) = graph_one_channel();
        let a = graph
            .add_effect(key, &EffectParams::default_for(EffectKind::Eq3))
            .unwrap();
        let b = graph
            .add_effect(key, &EffectParams::default_for(EffectKind::Compressor))
            .unwrap();
        let c = graph
            .add_effect(key, &EffectParams::default_for(EffectKind::Delay))
            .unwrap();

        assert!(graph.remove_effect(key, b));
        let edges = edge_set(graph.channel(key).unwrap());
        assert_eq!(
            edges,
            vec![
                (Port::Input, Port::Effect(a)),
                (Port::Effect(a), Port::Effect(c)),
                (Port::Effect(c), Port::Output),
            ]
        );
    }

    #[test]
    fn ops_on_removed_channel_are_noops() {
        let (mut graph, key) = graph_one_channel();
        let fx = graph
            .add_effect(key, &EffectParams::default_for(EffectKind::Eq3))
            .unwrap();
        assert!(graph.remove_channel(key));

        assert!(graph.add_effect(key, &EffectParams::default_for(EffectKind::Delay)).is_none());
        assert!(!graph.set_bypass(key, fx, true));
        assert!(!graph.remove_effect(key, fx));
        assert!(!graph.connect_send(key, 0, 0.5, false));
        graph.apply_param(key, PARAM_GAIN, 0.0, 0);
        graph.process_block(BLOCK_SIZE);
    }

    fn fill_input(graph: &mut MixerGraph, key: ChannelKey, value: f32) {
        let (l, r) = graph.input_mut(key).unwrap();
        l.fill(value);
        r.fill(value);
    }

    #[test]
    fn gain_scales_master_output() {
        let (mut graph, key) = graph_one_channel();
        graph.begin_block();
        fill_input(&mut graph, key, 0.5);
        graph.channel_mut(key).unwrap().gain = 0.5;
        graph.process_block(BLOCK_SIZE);
        let (ml, _) = graph.master();
        assert!((ml[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn mute_silences_channel() {
        let (mut graph, key) = graph_one_channel();
        graph.begin_block();
        fill_input(&mut graph, key, 0.5);
        graph.channel_mut(key).unwrap().mute = true;
        graph.process_block(BLOCK_SIZE);
        assert_eq!(graph.master().0[0], 0.0);
    }

    #[test]
    fn solo_isolates_channel() {
        let mut topo = MixerTopology::new();
        topo.add_channel(ChannelDesc::new("a"));
        topo.add_channel(ChannelDesc::new("b"));
        let (mut graph, keys) = MixerGraph::from_topology(&topo, SR);

        graph.begin_block();
        fill_input(&mut graph, keys[0], 0.4);
        fill_input(&mut graph, keys[1], 0.4);
        graph.channel_mut(keys[0]).unwrap().solo = true;
        graph.process_block(BLOCK_SIZE);

        // Only the soloed channel reaches the master.
        assert!((graph.master().0[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn hard_pan_left_kills_right() {
        let (mut graph, key) = graph_one_channel();
        graph.begin_block();
        fill_input(&mut graph, key, 0.5);
        graph.channel_mut(key).unwrap().pan = -1.0;
        graph.process_block(BLOCK_SIZE);
        let (ml, mr) = graph.master();
        assert!(ml[0] > 0.1);
        assert!(mr[0].abs() < 1e-6);
    }

    #[test]
    fn send_taps_into_bus() {
        let mut topo = MixerTopology::new();
        let ch = topo.add_channel(ChannelDesc::new("ch"));
        topo.add_bus(BusDesc::new("fx"));
        topo.channels[ch as usize].sends.push(SendDesc {
            bus: 0,
            level: 1.0,
            pre_fader: true,
        });
        let (mut graph, keys) = MixerGraph::from_topology(&topo, SR);

        graph.begin_block();
        fill_input(&mut graph, keys[0], 0.3);
        // Fader fully down: only the pre-fader send path reaches master.
        graph.channel_mut(keys[0]).unwrap().gain = 0.0;
        graph.process_block(BLOCK_SIZE);
        assert!((graph.master().0[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn post_fader_send_follows_gain() {
        let mut topo = MixerTopology::new();
        let ch = topo.add_channel(ChannelDesc::new("ch"));
        topo.add_bus(BusDesc::new("fx"));
        topo.channels[ch as usize].sends.push(SendDesc {
            bus: 0,
            level: 1.0,
            pre_fader: false,
        });
        let (mut graph, keys) = MixerGraph::from_topology(&topo, SR);

        graph.begin_block();
        fill_input(&mut graph, keys[0], 0.3);
        graph.channel_mut(keys[0]).unwrap().gain = 0.0;
        graph.process_block(BLOCK_SIZE);
        // Post-fader send of a silent fader contributes nothing.
        assert_eq!(graph.master().0[0], 0.0);
    }

    #[test]
    fn gain_ramp_reaches_target() {
        let (mut graph, key) = graph_one_channel();
        graph.apply_param(key, PARAM_GAIN, 0.0, (BLOCK_SIZE * 4) as u32);

        for _ in 0..4 {
            graph.begin_block();
            fill_input(&mut graph, key, 0.5);
            graph.process_block(BLOCK_SIZE);
        }
        assert_eq!(graph.channel(key).unwrap().gain, 0.0);
        assert_eq!(graph.master().0[0], 0.0);
    }

    #[test]
    fn peaks_track_output_level() {
        let (mut graph, key) = graph_one_channel();
        graph.begin_block();
        fill_input(&mut graph, key, 0.7);
        graph.process_block(BLOCK_SIZE);
        let (pl, pr) = graph.channel(key).unwrap().peaks();
        assert!((pl - 0.7).abs() < 1e-6);
        assert!((pr - 0.7).abs() < 1e-6);
    }
}
