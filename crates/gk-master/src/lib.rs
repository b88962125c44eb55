//! Headless engine controller for groovekit.
//!
//! [`EngineContext`] is the explicitly constructed object that owns the
//! whole engine: arrangement, mixer topology, instrument specs, and —
//! while playing — the control thread (scheduler) and audio thread
//! (renderer + device). Subsystems receive it by reference; there are no
//! module-level singletons and lifecycle is explicit construct/destroy.

mod wav;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use gk_audio::{AudioOutput, CpalOutput};
use gk_engine::{
    DispatchEvent, DispatchSink, EngineCommand, EventScheduler, Instrument, MixerGraph,
    RenderStats, Renderer, TimelineClock,
};
use gk_ir::{LoopRegion, TempoMap, Tick, BLOCK_SIZE};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

// Re-export common types so callers don't need gk-ir/gk-engine directly.
pub use gk_engine::{Frame, InstrumentParams, SampleData, SourceSpec};
pub use gk_ir::{Arrangement, Clip, MixerTopology, NoteSpan, Pattern, PlaybackMode};

pub use wav::{frames_to_wav, write_wav};

/// Command ring capacity between control and render contexts.
const COMMAND_RING: usize = 2048;

/// Control-thread scheduling cadence.
const SCHED_INTERVAL: Duration = Duration::from_millis(20);

/// Everything needed to build one instrument at play time.
#[derive(Clone)]
pub struct InstrumentSpec {
    pub params: InstrumentParams,
    pub sample: Option<SampleData>,
}

impl InstrumentSpec {
    pub fn new(params: InstrumentParams) -> Self {
        Self {
            params,
            sample: None,
        }
    }

    pub fn with_sample(params: InstrumentParams, sample: SampleData) -> Self {
        Self {
            params,
            sample: Some(sample),
        }
    }
}

/// Messages from the context API to the control thread.
enum ControlMsg {
    SetMode(PlaybackMode),
    SetTempo(f64),
    Seek(Tick),
    Shutdown,
}

/// Dispatch sink backed by the control→render command ring.
struct RingSink {
    producer: HeapProd<EngineCommand>,
}

impl DispatchSink for RingSink {
    fn send(&mut self, event: DispatchEvent) -> bool {
        self.producer
            .try_push(EngineCommand::Dispatch(event))
            .is_ok()
    }
}

struct PlaybackHandle {
    clock: TimelineClock,
    stop_signal: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    ctl_tx: mpsc::Sender<ControlMsg>,
    control: Option<JoinHandle<()>>,
    audio: Option<JoinHandle<()>>,
}

/// Owns a song's data and manages playback.
pub struct EngineContext {
    arrangement: Arrangement,
    topology: MixerTopology,
    instruments: Vec<InstrumentSpec>,
    tempo_bpm: f64,
    mode: PlaybackMode,
    playback: Option<PlaybackHandle>,
}

impl EngineContext {
    pub fn new(
        arrangement: Arrangement,
        topology: MixerTopology,
        instruments: Vec<InstrumentSpec>,
    ) -> Self {
        Self {
            arrangement,
            topology,
            instruments,
            tempo_bpm: 120.0,
            mode: PlaybackMode::Song,
            playback: None,
        }
    }

    pub fn arrangement(&self) -> &Arrangement {
        &self.arrangement
    }

    pub fn set_tempo(&mut self, bpm: f64) {
        self.tempo_bpm = bpm;
        if let Some(pb) = &self.playback {
            let _ = pb.ctl_tx.send(ControlMsg::SetTempo(bpm));
        }
    }

    /// Switch playback mode. Mid-playback, all pending dispatches from
    /// the old mode are cancelled before the new mode schedules anything.
    pub fn set_mode(&mut self, mode: PlaybackMode) {
        self.mode = mode;
        if let Some(pb) = &self.playback {
            let _ = pb.ctl_tx.send(ControlMsg::SetMode(mode));
        }
    }

    pub fn seek(&mut self, tick: Tick) {
        if let Some(pb) = &self.playback {
            let _ = pb.ctl_tx.send(ControlMsg::Seek(tick));
        }
    }

    /// Published playback position for the UI layer; read-only and
    /// throttle-friendly.
    pub fn position_ticks(&self) -> Option<Tick> {
        let pb = self.playback.as_ref()?;
        if pb.finished.load(Ordering::Relaxed) {
            return None;
        }
        Some(pb.clock.position_ticks())
    }

    pub fn is_playing(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| !p.finished.load(Ordering::Relaxed))
    }

    pub fn is_finished(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| p.finished.load(Ordering::Relaxed))
    }

    // --- Real-time playback ---

    pub fn play(&mut self) {
        self.stop();

        let clock = TimelineClock::new(TempoMap::new(self.tempo_bpm, 44_100.0));
        clock.set_loop_region(loop_region_for(self.mode, &self.arrangement));

        let (cmd_prod, cmd_cons) = HeapRb::<EngineCommand>::new(COMMAND_RING).split();
        let (ctl_tx, ctl_rx) = mpsc::channel();
        let (stats_tx, stats_rx) = mpsc::channel();
        let stop_signal = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let audio = {
            let topology = self.topology.clone();
            let specs = self.instruments.clone();
            let clock = clock.clone();
            let stop = stop_signal.clone();
            let done = finished.clone();
            let bpm = self.tempo_bpm;
            std::thread::spawn(move || {
                audio_thread(topology, specs, bpm, clock, cmd_cons, stats_tx, stop, done);
            })
        };

        let control = {
            let arrangement = self.arrangement.clone();
            let alive = vec![true; self.instruments.len()];
            let clock = clock.clone();
            let stop = stop_signal.clone();
            let mode = self.mode;
            std::thread::spawn(move || {
                control_thread(arrangement, mode, alive, clock, cmd_prod, ctl_rx, stats_rx, stop);
            })
        };

        self.playback = Some(PlaybackHandle {
            clock,
            stop_signal,
            finished,
            ctl_tx,
            control: Some(control),
            audio: Some(audio),
        });
    }

    pub fn stop(&mut self) {
        if let Some(mut pb) = self.playback.take() {
            let _ = pb.ctl_tx.send(ControlMsg::Shutdown);
            pb.stop_signal.store(true, Ordering::Relaxed);
            if let Some(handle) = pb.control.take() {
                let _ = handle.join();
            }
            if let Some(handle) = pb.audio.take() {
                let _ = handle.join();
            }
        }
    }

    // --- Offline rendering ---

    /// Deterministic single-threaded render: the scheduler and renderer
    /// are stepped in lockstep, block by block.
    pub fn render_frames(&self, sample_rate: u32, max_frames: usize) -> Vec<Frame> {
        let clock = TimelineClock::new(TempoMap::new(self.tempo_bpm, sample_rate as f64));
        clock.set_loop_region(loop_region_for(self.mode, &self.arrangement));

        let (mixer, keys) = MixerGraph::from_topology(&self.topology, sample_rate as f32);
        let instruments = build_instruments(&self.instruments, sample_rate as f32);
        let mut renderer = Renderer::new(clock.clone(), mixer, keys, instruments);
        let mut scheduler = EventScheduler::new(self.mode, &clock);
        let alive = vec![true; self.instruments.len()];

        renderer.command(EngineCommand::Play);

        let mut frames = Vec::with_capacity(max_frames);
        let mut pending: Vec<DispatchEvent> = Vec::new();
        let mut block = [Frame::silence(); BLOCK_SIZE];

        while frames.len() < max_frames {
            pending.clear();
            scheduler.run(&clock, &self.arrangement, &alive, &mut pending);
            for event in pending.drain(..) {
                renderer.command(EngineCommand::Dispatch(event));
            }

            renderer.render_block(&mut block);
            let take = BLOCK_SIZE.min(max_frames - frames.len());
            frames.extend_from_slice(&block[..take]);
        }
        frames
    }

    pub fn render_to_wav(&self, sample_rate: u32, max_seconds: u32) -> Vec<u8> {
        let max_frames = (sample_rate * max_seconds) as usize;
        let frames = self.render_frames(sample_rate, max_frames);
        wav::frames_to_wav(&frames, sample_rate)
    }
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_instruments(specs: &[InstrumentSpec], sample_rate: f32) -> Vec<Instrument> {
    specs
        .iter()
        .map(|spec| {
            let mut inst = Instrument::new(spec.params, sample_rate, BLOCK_SIZE);
            if let Some(sample) = &spec.sample {
                inst.set_sample(sample.clone());
            }
            inst
        })
        .collect()
}

fn loop_region_for(mode: PlaybackMode, arrangement: &Arrangement) -> LoopRegion {
    match mode {
        PlaybackMode::PatternLoop { pattern, .. } => {
            let length = arrangement
                .patterns
                .get(pattern as usize)
                .map(|p| p.length)
                .unwrap_or(0);
            LoopRegion::new(0, length as u32)
        }
        PlaybackMode::Song => LoopRegion::disabled(),
    }
}

#[allow(clippy::too_many_arguments)]
fn audio_thread(
    topology: MixerTopology,
    specs: Vec<InstrumentSpec>,
    tempo_bpm: f64,
    clock: TimelineClock,
    mut commands: HeapCons<EngineCommand>,
    stats_tx: mpsc::Sender<Arc<RenderStats>>,
    stop_signal: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
) {
    let Ok((mut output, consumer)) = CpalOutput::new() else {
        finished.store(true, Ordering::Relaxed);
        return;
    };

    let sample_rate = output.sample_rate();
    // The device decides the real rate; republish the tempo against it.
    clock.set_tempo(TempoMap::new(tempo_bpm, sample_rate as f64));

    let (mixer, keys) = MixerGraph::from_topology(&topology, sample_rate as f32);
    let instruments = build_instruments(&specs, sample_rate as f32);
    let mut renderer = Renderer::new(clock, mixer, keys, instruments);
    let _ = stats_tx.send(renderer.stats());

    if output.build_stream(consumer).is_err() {
        finished.store(true, Ordering::Relaxed);
        return;
    }
    let _ = output.start();
    renderer.command(EngineCommand::Play);

    let mut block = [Frame::silence(); BLOCK_SIZE];
    while !stop_signal.load(Ordering::Relaxed) {
        while let Some(command) = commands.try_pop() {
            renderer.command(command);
        }
        renderer.render_block(&mut block);
        for frame in block {
            // Backpressure from the device ring paces the render loop.
            output.write_spin(frame);
        }
    }

    renderer.command(EngineCommand::Stop);
    for _ in 0..(sample_rate / 4) {
        output.write_spin(Frame::silence());
    }
    let _ = output.stop();
    finished.store(true, Ordering::Relaxed);
}

#[allow(clippy::too_many_arguments)]
fn control_thread(
    arrangement: Arrangement,
    mode: PlaybackMode,
    alive: Vec<bool>,
    clock: TimelineClock,
    cmd_prod: HeapProd<EngineCommand>,
    ctl_rx: mpsc::Receiver<ControlMsg>,
    stats_rx: mpsc::Receiver<Arc<RenderStats>>,
    stop_signal: Arc<AtomicBool>,
) {
    let stats = stats_rx.recv_timeout(Duration::from_secs(2)).ok();
    let mut scheduler = EventScheduler::new(mode, &clock);
    let mut sink = RingSink { producer: cmd_prod };
    let mut logged = StatWatermarks::default();

    while !stop_signal.load(Ordering::Relaxed) {
        while let Ok(msg) = ctl_rx.try_recv() {
            match msg {
                ControlMsg::SetMode(mode) => {
                    let generation = scheduler.set_mode(mode, &clock);
                    let _ = sink
                        .producer
                        .try_push(EngineCommand::SetGeneration(generation));
                    clock.set_loop_region(loop_region_for(mode, &arrangement));
                }
                ControlMsg::SetTempo(bpm) => {
                    clock.set_bpm(bpm);
                }
                ControlMsg::Seek(tick) => {
                    scheduler.seek(tick);
                    let _ = sink
                        .producer
                        .try_push(EngineCommand::SeekSamples(clock.tick_to_samples(tick)));
                }
                ControlMsg::Shutdown => return,
            }
        }

        scheduler.run(&clock, &arrangement, &alive, &mut sink);

        if let Some(stats) = &stats {
            logged.drain(stats);
        }

        std::thread::sleep(SCHED_INTERVAL);
    }
}

/// Tracks already-logged counter values so each render-side incident is
/// reported once.
#[derive(Default)]
struct StatWatermarks {
    late: u64,
    dropped: u64,
    denied: u64,
    invalid: u64,
}

impl StatWatermarks {
    fn drain(&mut self, stats: &RenderStats) {
        let late = stats.late();
        if late > self.late {
            log::warn!("{} event(s) arrived late and were clamped", late - self.late);
            self.late = late;
        }
        let dropped = stats.dropped();
        if dropped > self.dropped {
            log::warn!("{} event(s) dropped: dispatch queue full", dropped - self.dropped);
            self.dropped = dropped;
        }
        let denied = stats.denied();
        if denied > self.denied {
            log::warn!("{} allocation(s) denied: pool exhausted", denied - self.denied);
            self.denied = denied;
        }
        let invalid = stats.invalid();
        if invalid > self.invalid {
            log::warn!(
                "{} release(s) ignored: no voice bound to note",
                invalid - self.invalid
            );
            self.invalid = invalid;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gk_ir::ChannelDesc;

    fn demo_context() -> EngineContext {
        let mut pattern = Pattern::new(384);
        pattern.notes.push(NoteSpan {
            tick: 0,
            duration: 96,
            note: 60,
            velocity: 100,
        });
        pattern.notes.push(NoteSpan {
            tick: 192,
            duration: 96,
            note: 67,
            velocity: 90,
        });

        let mut arrangement = Arrangement::new();
        let idx = arrangement.add_pattern(pattern);
        arrangement.add_clip(Clip {
            pattern: idx,
            at: 0,
            instrument: 0,
        });

        let mut topology = MixerTopology::new();
        topology.add_channel(ChannelDesc::new("lead"));

        EngineContext::new(
            arrangement,
            topology,
            vec![InstrumentSpec::new(InstrumentParams::default())],
        )
    }

    #[test]
    fn offline_render_is_audible() {
        let ctx = demo_context();
        let frames = ctx.render_frames(44_100, 44_100);
        assert!(frames.iter().any(|f| f.left.abs() > 0.01));
    }

    #[test]
    fn offline_render_is_deterministic() {
        let ctx = demo_context();
        let a = ctx.render_frames(44_100, 22_050);
        let b = ctx.render_frames(44_100, 22_050);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.left.to_bits(), y.left.to_bits());
            assert_eq!(x.right.to_bits(), y.right.to_bits());
        }
    }

    #[test]
    fn wav_export_has_expected_size() {
        let ctx = demo_context();
        let wav = ctx.render_to_wav(44_100, 1);
        assert_eq!(wav.len(), 44 + 44_100 * 4);
    }

    #[test]
    fn silence_after_notes_end() {
        let ctx = demo_context();
        // 384 ticks = 1 bar = 2 s at 120 BPM; render 3 s.
        let frames = ctx.render_frames(44_100, 44_100 * 3);
        let tail = &frames[44_100 * 5 / 2..];
        assert!(tail.iter().all(|f| f.left.abs() < 1e-3));
    }
}
