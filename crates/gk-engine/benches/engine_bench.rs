//! Render-path benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gk_engine::{
    AdsrParams, EngineCommand, Eq3Params, Eq3Unit, Frame, Instrument, InstrumentParams,
    MixerGraph, Renderer, Retrigger, StealPolicy, TimelineClock, VoicePool, VoiceSource,
    note_frequency,
};
use gk_ir::{ChannelDesc, MixerTopology, TempoMap, BLOCK_SIZE};

const SR: f32 = 44_100.0;

fn bench_voice_pool(c: &mut Criterion) {
    let mut pool = VoicePool::new(32, SR, BLOCK_SIZE);
    for note in 0..16u8 {
        pool.allocate(
            60 + note,
            100,
            VoiceSource::Osc {
                phase: 0.0,
                incr: note_frequency(60 + note) / SR,
            },
            AdsrParams::default(),
            None,
            Retrigger::Poly,
            StealPolicy::Steal,
        );
    }

    let mut l = [0.0f32; BLOCK_SIZE];
    let mut r = [0.0f32; BLOCK_SIZE];
    c.bench_function("pool_render_16_voices", |b| {
        b.iter(|| {
            l.fill(0.0);
            r.fill(0.0);
            pool.render_into(None, black_box(&mut l), black_box(&mut r), 0.5);
        })
    });
}

fn bench_eq3(c: &mut Criterion) {
    let mut eq = Eq3Unit::new(SR);
    eq.set_params(Eq3Params {
        low_gain_db: 3.0,
        mid_gain_db: -2.0,
        high_gain_db: 4.0,
        low_freq: 320.0,
        high_freq: 3200.0,
    });
    eq.ensure_coeffs();

    c.bench_function("eq3_block", |b| {
        b.iter(|| {
            let mut acc = 0.0f32;
            for i in 0..BLOCK_SIZE {
                acc += eq.process(black_box(i as f32 / BLOCK_SIZE as f32 - 0.5));
            }
            black_box(acc)
        })
    });
}

fn bench_full_render(c: &mut Criterion) {
    let clock = TimelineClock::new(TempoMap::new(120.0, SR as f64));
    let mut topo = MixerTopology::new();
    topo.add_channel(ChannelDesc::new("ch"));
    let (mixer, keys) = MixerGraph::from_topology(&topo, SR);
    let instruments = vec![Instrument::new(InstrumentParams::default(), SR, BLOCK_SIZE)];
    let mut renderer = Renderer::new(clock, mixer, keys, instruments);
    renderer.command(EngineCommand::Play);

    let mut out = [Frame::silence(); BLOCK_SIZE];
    c.bench_function("renderer_block", |b| {
        b.iter(|| renderer.render_block(black_box(&mut out)))
    });
}

criterion_group!(benches, bench_voice_pool, bench_eq3, bench_full_render);
criterion_main!(benches);
