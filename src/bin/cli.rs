//! groovekit CLI — plays a built-in demo arrangement or renders it to WAV.
//!
//! Usage:
//!   gk-cli [--seconds N]
//!   gk-cli --wav output.wav [--seconds N]

use std::io::Write;
use std::{env, fs};

use gk_engine::{AdsrParams, FilterKind, Retrigger, SvfParams};
use gk_ir::{
    BusDesc, ChannelDesc, EffectKind, EffectParams, EffectDesc, SendDesc, PPQ,
};
use gk_master::{
    Arrangement, Clip, EngineContext, InstrumentParams, InstrumentSpec, NoteSpan, Pattern,
    SourceSpec,
};

fn main() {
    let args: Vec<String> = env::args().collect();

    let wav_path = args
        .iter()
        .position(|a| a == "--wav")
        .and_then(|i| args.get(i + 1))
        .cloned();

    let seconds: u32 = args
        .iter()
        .position(|a| a == "--seconds")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(8);

    let mut ctx = demo_song();

    println!("groovekit demo");
    println!("Patterns: {}", ctx.arrangement().patterns.len());
    println!("Clips:    {}", ctx.arrangement().clips.len());
    println!();

    match wav_path {
        Some(path) => render_to_wav(&ctx, &path, seconds),
        None => play_audio(&mut ctx, seconds),
    }
}

/// Two instruments over four bars: a mono bass line and a poly lead.
fn demo_song() -> EngineContext {
    let bar = 4 * PPQ as u64;
    let beat = PPQ as u64;

    let mut bass = Pattern::new(bar);
    for (i, note) in [36u8, 36, 43, 41].iter().enumerate() {
        bass.notes.push(NoteSpan {
            tick: i as u64 * beat,
            duration: beat / 2,
            note: *note,
            velocity: 110,
        });
    }

    let mut lead = Pattern::new(bar);
    for (i, chord) in [[60u8, 64, 67], [60, 65, 69], [59, 62, 67], [60, 64, 67]]
        .iter()
        .enumerate()
    {
        for note in chord {
            lead.notes.push(NoteSpan {
                tick: i as u64 * beat,
                duration: beat * 3 / 4,
                note: *note,
                velocity: 85,
            });
        }
    }

    let mut arrangement = Arrangement::new();
    let bass_idx = arrangement.add_pattern(bass);
    let lead_idx = arrangement.add_pattern(lead);
    for bar_idx in 0..4u64 {
        arrangement.add_clip(Clip {
            pattern: bass_idx,
            at: bar_idx * bar,
            instrument: 0,
        });
        if bar_idx >= 1 {
            arrangement.add_clip(Clip {
                pattern: lead_idx,
                at: bar_idx * bar,
                instrument: 1,
            });
        }
    }

    let mut topology = gk_master::MixerTopology::new();
    let mut bass_ch = ChannelDesc::new("bass");
    bass_ch.gain = 0.9;
    topology.add_channel(bass_ch);

    let mut lead_ch = ChannelDesc::new("lead");
    lead_ch.gain = 0.7;
    lead_ch
        .inserts
        .push(EffectDesc::new(EffectParams::default_for(EffectKind::Eq3)));
    lead_ch.sends.push(SendDesc {
        bus: 0,
        level: 0.4,
        pre_fader: false,
    });
    topology.add_channel(lead_ch);
    topology.add_bus(BusDesc::new("echo"));

    let bass_spec = InstrumentSpec::new(InstrumentParams {
        adsr: AdsrParams {
            attack: 0.005,
            decay: 0.15,
            sustain: 0.6,
            release: 0.12,
        },
        filter: Some(SvfParams {
            cutoff: 900.0,
            q: 0.8,
            kind: FilterKind::LowPass,
        }),
        retrigger: Retrigger::Mono,
        channel: 0,
        source: SourceSpec::Osc,
        voices: 4,
        ..Default::default()
    });

    let lead_spec = InstrumentSpec::new(InstrumentParams {
        adsr: AdsrParams {
            attack: 0.02,
            decay: 0.2,
            sustain: 0.5,
            release: 0.3,
        },
        channel: 1,
        source: SourceSpec::Osc,
        voices: 16,
        ..Default::default()
    });

    EngineContext::new(arrangement, topology, vec![bass_spec, lead_spec])
}

fn play_audio(ctx: &mut EngineContext, seconds: u32) {
    ctx.play();
    println!("Playing for {} seconds...", seconds);

    let started = std::time::Instant::now();
    while ctx.is_playing() && started.elapsed().as_secs() < seconds as u64 {
        if let Some(ticks) = ctx.position_ticks() {
            let beat = ticks / PPQ as u64;
            print!("\rBar: {:02} | Beat: {}", beat / 4 + 1, beat % 4 + 1);
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    ctx.stop();
    println!("\rDone.            ");
}

fn render_to_wav(ctx: &EngineContext, path: &str, seconds: u32) {
    let sample_rate: u32 = 44_100;
    println!("Rendering {} s to {} at {} Hz...", seconds, path, sample_rate);

    let wav = ctx.render_to_wav(sample_rate, seconds);
    println!("Rendered {} bytes", wav.len());

    fs::write(path, &wav).unwrap_or_else(|e| {
        eprintln!("Failed to write {}: {}", path, e);
        std::process::exit(1);
    });

    println!("Done.");
}
