//! Planar f32 block buffer.

use alloc::{vec, vec::Vec};

/// Render quantum in frames. All block processing uses this size.
pub const BLOCK_SIZE: usize = 128;

/// A multichannel f32 buffer in planar layout.
///
/// Data is stored as `channels` contiguous planes of `frames` samples.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    data: Vec<f32>,
    channels: usize,
    frames: usize,
}

impl AudioBuffer {
    /// Create a silent buffer.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            data: vec![0.0; channels * frames],
            channels,
            frames,
        }
    }

    /// A stereo buffer of one render block.
    pub fn stereo_block() -> Self {
        Self::new(2, BLOCK_SIZE)
    }

    /// Fill all samples with zero.
    pub fn silence(&mut self) {
        self.data.fill(0.0);
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Read-only access to one channel plane.
    pub fn channel(&self, ch: usize) -> &[f32] {
        let start = ch * self.frames;
        &self.data[start..start + self.frames]
    }

    /// Mutable access to one channel plane.
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let start = ch * self.frames;
        &mut self.data[start..start + self.frames]
    }

    /// Simultaneous mutable access to the first two planes.
    pub fn stereo_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        let (l, rest) = self.data.split_at_mut(self.frames);
        (l, &mut rest[..self.frames])
    }

    /// Sum overlapping channels from `source` into this buffer with gain.
    pub fn mix_from_scaled(&mut self, source: &AudioBuffer, gain: f32) {
        let chs = self.channels.min(source.channels);
        let frs = self.frames.min(source.frames);
        for ch in 0..chs {
            let start = ch * self.frames;
            let dst = &mut self.data[start..start + frs];
            let src = &source.channel(ch)[..frs];
            for i in 0..frs {
                dst[i] += src[i] * gain;
            }
        }
    }

    /// Scale all samples by `gain`.
    pub fn apply_gain(&mut self, gain: f32) {
        for s in &mut self.data {
            *s *= gain;
        }
    }

    /// Peak absolute value of one channel plane.
    pub fn peak(&self, ch: usize) -> f32 {
        self.channel(ch)
            .iter()
            .fold(0.0f32, |acc, &s| acc.max(s.max(-s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_silent() {
        let buf = AudioBuffer::new(2, 4);
        assert!(buf.channel(0).iter().all(|&s| s == 0.0));
        assert!(buf.channel(1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn stereo_mut_gives_distinct_planes() {
        let mut buf = AudioBuffer::new(2, 4);
        {
            let (l, r) = buf.stereo_mut();
            l[0] = 1.0;
            r[3] = -0.5;
        }
        assert_eq!(buf.channel(0)[0], 1.0);
        assert_eq!(buf.channel(1)[3], -0.5);
    }

    #[test]
    fn silence_clears() {
        let mut buf = AudioBuffer::new(1, 2);
        buf.channel_mut(0)[0] = 1.0;
        buf.silence();
        assert_eq!(buf.channel(0), &[0.0, 0.0]);
    }

    #[test]
    fn mix_from_scaled_applies_gain() {
        let mut dst = AudioBuffer::new(1, 2);
        let mut src = AudioBuffer::new(1, 2);
        src.channel_mut(0)[0] = 1.0;
        src.channel_mut(0)[1] = -1.0;
        dst.mix_from_scaled(&src, 0.5);
        assert!((dst.channel(0)[0] - 0.5).abs() < 1e-6);
        assert!((dst.channel(0)[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn peak_is_absolute() {
        let mut buf = AudioBuffer::new(1, 3);
        buf.channel_mut(0)[1] = -0.8;
        buf.channel_mut(0)[2] = 0.3;
        assert!((buf.peak(0) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn mismatched_mix_uses_minimum() {
        let mut dst = AudioBuffer::new(2, 4);
        let mut src = AudioBuffer::new(1, 2);
        src.channel_mut(0)[0] = 1.0;
        dst.mix_from_scaled(&src, 1.0);
        assert_eq!(dst.channel(0)[0], 1.0);
        assert_eq!(dst.channel(0)[2], 0.0);
        assert_eq!(dst.channel(1)[0], 0.0);
    }
}
