//! Temporal dithering.
//!
//! Scaling a channel down throws away low bits. Dithering adds a small,
//! frame-dependent offset before scaling so that, averaged over a few
//! frames, the eye sees the exact fractional intensity.

use crate::color::Rgb;
use crate::math8::{reverse8, scale8};

/// Highest refresh rate worth planning the dither cycle for.
pub const MAX_LIKELY_UPDATE_RATE_HZ: u16 = 400;

/// Slowest full dither cycle that does not read as flicker.
pub const MIN_ACCEPTABLE_DITHER_RATE_HZ: u16 = 50;

/// Virtual bits for the default rates (8 frames per cycle).
pub const RECOMMENDED_VIRTUAL_BITS: u8 =
    recommended_virtual_bits(MAX_LIKELY_UPDATE_RATE_HZ, MIN_ACCEPTABLE_DITHER_RATE_HZ);

/// Number of extra "virtual" bits of resolution gained by dithering.
///
/// One bit per doubling of frames that fit into a full dither cycle.
#[allow(clippy::cast_possible_truncation)]
pub const fn recommended_virtual_bits(max_update_hz: u16, min_dither_hz: u16) -> u8 {
    if min_dither_hz == 0 {
        return 0;
    }
    let updates = max_update_hz / min_dither_hz;
    let mut bits = 0;
    let mut threshold = 1;
    while bits < 8 && updates > threshold {
        bits += 1;
        threshold <<= 1;
    }
    bits
}

/// Dithering mode of a strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DitherMode {
    /// No dithering, channels are truncated.
    Disabled,
    /// Binary (ordered) temporal dithering.
    #[default]
    Binary,
}

/// Frame counter that drives the dither pattern.
///
/// Each strip owns one; it wraps every `2^bits` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DitherCounter {
    frame: u8,
    bits: u8,
}

impl DitherCounter {
    /// Counter with [`RECOMMENDED_VIRTUAL_BITS`].
    pub const fn new() -> Self {
        Self::with_bits(RECOMMENDED_VIRTUAL_BITS)
    }

    /// Counter with a custom number of virtual bits (clamped to 8).
    pub const fn with_bits(bits: u8) -> Self {
        Self {
            frame: 0,
            bits: if bits > 8 { 8 } else { bits },
        }
    }

    /// Frames in a full dither cycle.
    pub const fn period(&self) -> u16 {
        1 << self.bits
    }

    /// Advance to the next frame and return its dither phase.
    ///
    /// The phase is the bit-reversed frame number, centered in the bucket
    /// the virtual bits leave free.
    #[allow(clippy::cast_possible_truncation)]
    pub fn next_phase(&mut self) -> u8 {
        let mask = ((1u16 << self.bits) - 1) as u8;
        self.frame = self.frame.wrapping_add(1) & mask;

        let mut phase = reverse8(self.frame);
        if self.bits < 8 {
            phase = phase.wrapping_add(1 << (7 - self.bits));
        }
        phase
    }
}

impl Default for DitherCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Dither offsets and steps for one frame, indexed by color channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DitherState {
    offsets: [u8; 3],
    steps: [u8; 3],
}

impl DitherState {
    /// State that leaves every byte untouched.
    pub const DISABLED: Self = Self {
        offsets: [0; 3],
        steps: [0; 3],
    };

    /// Compute the offsets for one frame from its phase and the channel scales.
    ///
    /// The step is one quantization bucket at the given scale
    /// (`256 / scale`), the offset is the phase's share of that bucket.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(phase: u8, scale: Rgb) -> Self {
        let mut state = Self::DISABLED;
        for (channel, s) in [scale.r, scale.g, scale.b].into_iter().enumerate() {
            let mut step = if s == 0 { 0 } else { (256 / u16::from(s) + 1) as u8 };
            let mut offset = scale8(phase, step);
            if offset != 0 {
                offset -= 1;
            }
            if step != 0 {
                step -= 1;
            }
            state.offsets[channel] = offset;
            state.steps[channel] = step;
        }
        state
    }

    /// Current offset of a channel (0 = red, 1 = green, 2 = blue).
    #[inline]
    pub const fn offset(&self, channel: usize) -> u8 {
        self.offsets[channel]
    }

    /// Step of a channel.
    #[inline]
    pub const fn step(&self, channel: usize) -> u8 {
        self.steps[channel]
    }

    /// Flip every channel's offset to the other side of its bucket.
    ///
    /// Called once per pixel so neighbouring pixels dither in opposite
    /// directions.
    #[inline]
    pub fn step_all(&mut self) {
        for channel in 0..3 {
            self.step_channel(channel);
        }
    }

    #[inline]
    pub fn step_channel(&mut self, channel: usize) {
        self.offsets[channel] = self.steps[channel].wrapping_sub(self.offsets[channel]);
    }
}
