//! Shared timeline clock.
//!
//! The render context is the only writer of the playback position; the
//! control context publishes tempo and loop changes. Every shared value is
//! a single 64-bit atomic, so a reader on either side never observes a
//! torn tick↔time mapping, and no access blocks.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};

use gk_ir::{pack_region, unpack_region, LoopRegion, TempoMap, Tick};

struct ClockShared {
    /// Absolute playback position in samples. Written by the render context.
    position: AtomicU64,
    /// f64 bit-pattern of the current samples-per-tick value.
    samples_per_tick: AtomicU64,
    /// f64 bit-pattern of the output sample rate.
    sample_rate: AtomicU64,
    /// Packed loop region in ticks (start << 32 | end); start == end disables.
    loop_region: AtomicU64,
    /// Bumped on every tempo change so the scheduler re-derives conversions.
    tempo_epoch: AtomicU64,
    /// Bumped on every loop wrap so the scheduler rewinds its window.
    wrap_epoch: AtomicU64,
}

/// Cloneable handle to the shared clock. All methods are lock-free.
#[derive(Clone)]
pub struct TimelineClock {
    shared: Arc<ClockShared>,
}

impl TimelineClock {
    /// Create a clock at position zero with the given tempo.
    pub fn new(tempo: TempoMap) -> Self {
        Self {
            shared: Arc::new(ClockShared {
                position: AtomicU64::new(0),
                samples_per_tick: AtomicU64::new(tempo.samples_per_tick().to_bits()),
                sample_rate: AtomicU64::new(tempo.sample_rate.to_bits()),
                loop_region: AtomicU64::new(0),
                tempo_epoch: AtomicU64::new(0),
                wrap_epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Publish a tempo change as a single atomic store.
    pub fn set_tempo(&self, tempo: TempoMap) {
        self.shared
            .sample_rate
            .store(tempo.sample_rate.to_bits(), Ordering::Relaxed);
        self.shared
            .samples_per_tick
            .store(tempo.samples_per_tick().to_bits(), Ordering::Relaxed);
        self.shared.tempo_epoch.fetch_add(1, Ordering::Relaxed);
    }

    /// Change BPM while keeping the published sample rate.
    pub fn set_bpm(&self, bpm: f64) {
        self.set_tempo(TempoMap::new(bpm, self.sample_rate()));
    }

    /// The output sample rate the clock was configured with.
    pub fn sample_rate(&self) -> f64 {
        f64::from_bits(self.shared.sample_rate.load(Ordering::Relaxed))
    }

    /// Current samples-per-tick conversion factor.
    pub fn samples_per_tick(&self) -> f64 {
        f64::from_bits(self.shared.samples_per_tick.load(Ordering::Relaxed))
    }

    /// Counter incremented on every tempo change.
    pub fn tempo_epoch(&self) -> u64 {
        self.shared.tempo_epoch.load(Ordering::Relaxed)
    }

    /// Counter incremented on every loop wrap.
    pub fn wrap_epoch(&self) -> u64 {
        self.shared.wrap_epoch.load(Ordering::Relaxed)
    }

    /// Publish loop points as a single atomic store.
    pub fn set_loop_region(&self, region: LoopRegion) {
        self.shared
            .loop_region
            .store(pack_region(region.start, region.end), Ordering::Relaxed);
    }

    /// Current loop region.
    pub fn loop_region(&self) -> LoopRegion {
        let (start, end) = unpack_region(self.shared.loop_region.load(Ordering::Relaxed));
        LoopRegion::new(start, end)
    }

    /// Absolute playback position in samples.
    pub fn position_samples(&self) -> u64 {
        self.shared.position.load(Ordering::Relaxed)
    }

    /// Absolute playback position in ticks.
    pub fn position_ticks(&self) -> Tick {
        (self.position_samples() as f64 / self.samples_per_tick()) as Tick
    }

    /// Convert an absolute tick to an absolute sample position using the
    /// current tempo snapshot.
    pub fn tick_to_samples(&self, tick: Tick) -> u64 {
        (tick as f64 * self.samples_per_tick()) as u64
    }

    /// Convert an absolute sample position to ticks.
    pub fn samples_to_ticks(&self, samples: u64) -> Tick {
        (samples as f64 / self.samples_per_tick()) as Tick
    }

    /// Jump to an absolute sample position.
    pub fn seek_samples(&self, samples: u64) {
        self.shared.position.store(samples, Ordering::Relaxed);
    }

    /// Jump to an absolute tick.
    pub fn seek_ticks(&self, tick: Tick) {
        self.seek_samples(self.tick_to_samples(tick));
    }

    /// Advance by one render block, wrapping at the loop end.
    ///
    /// Only the render context calls this. Returns true when the position
    /// wrapped; the overshoot past the loop end is preserved modulo the
    /// loop length so no samples of musical time are lost.
    pub fn advance(&self, frames: u64) -> bool {
        let mut pos = self.position_samples() + frames;
        let mut wrapped = false;

        let region = self.loop_region();
        if region.is_enabled() {
            let spt = self.samples_per_tick();
            let end = (region.end as f64 * spt) as u64;
            if pos >= end {
                let start = (region.start as f64 * spt) as u64;
                let len = end.saturating_sub(start);
                if len > 0 {
                    pos = start + (pos - end) % len;
                    wrapped = true;
                    self.shared.wrap_epoch.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        self.shared.position.store(pos, Ordering::Relaxed);
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock_120() -> TimelineClock {
        TimelineClock::new(TempoMap::new(120.0, 44_100.0))
    }

    #[test]
    fn starts_at_zero() {
        let clock = clock_120();
        assert_eq!(clock.position_samples(), 0);
        assert_eq!(clock.position_ticks(), 0);
    }

    #[test]
    fn advance_moves_position() {
        let clock = clock_120();
        clock.advance(128);
        clock.advance(128);
        assert_eq!(clock.position_samples(), 256);
    }

    #[test]
    fn ticks_follow_samples() {
        let clock = clock_120();
        // One beat at 120 BPM / 44.1k = 22050 samples = 96 ticks
        clock.seek_samples(22_050);
        assert_eq!(clock.position_ticks(), 96);
    }

    #[test]
    fn tempo_change_updates_conversion() {
        let clock = clock_120();
        let before = clock.samples_per_tick();
        clock.set_tempo(TempoMap::new(240.0, 44_100.0));
        assert!((clock.samples_per_tick() - before / 2.0).abs() < 1e-9);
        assert_eq!(clock.tempo_epoch(), 1);
    }

    #[test]
    fn loop_wrap_preserves_overshoot() {
        let clock = clock_120();
        // One beat loop: [0, 96) ticks = [0, 22050) samples
        clock.set_loop_region(LoopRegion::new(0, 96));
        clock.seek_samples(22_000);
        let wrapped = clock.advance(128);
        assert!(wrapped);
        assert_eq!(clock.position_samples(), 78);
        assert_eq!(clock.wrap_epoch(), 1);
    }

    #[test]
    fn no_wrap_when_disabled() {
        let clock = clock_120();
        clock.seek_samples(1_000_000);
        assert!(!clock.advance(128));
        assert_eq!(clock.position_samples(), 1_000_128);
    }

    #[test]
    fn wrap_into_region_start() {
        let clock = clock_120();
        clock.set_loop_region(LoopRegion::new(96, 192));
        let end = clock.tick_to_samples(192);
        clock.seek_samples(end - 10);
        clock.advance(10);
        assert_eq!(clock.position_samples(), clock.tick_to_samples(96));
    }

    #[test]
    fn readers_see_whole_updates() {
        // A loop-region store is one u64; start/end can't tear.
        let clock = clock_120();
        clock.set_loop_region(LoopRegion::new(123, 456));
        let r = clock.loop_region();
        assert_eq!((r.start, r.end), (123, 456));
    }
}
