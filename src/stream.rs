//! Pixel stream cursor.
//!
//! Encoders never touch color buffers directly. They pull bytes from a
//! [`PixelStream`], which walks the buffer in wire order and applies the
//! strip's channel order, dithering and per-channel scale on the way out.

use crate::color::Rgb;
use crate::dither::{DitherCounter, DitherMode, DitherState};
use crate::error::{Error, Result};
use crate::math8::{qadd8, scale8};

/// Order in which a strip expects the color channels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Rbg,
    Grb,
    Gbr,
    Brg,
    Bgr,
}

impl ChannelOrder {
    /// Color channel (0 = red, 1 = green, 2 = blue) sent in each wire slot.
    pub const fn offsets(self) -> [usize; 3] {
        match self {
            Self::Rgb => [0, 1, 2],
            Self::Rbg => [0, 2, 1],
            Self::Grb => [1, 0, 2],
            Self::Gbr => [1, 2, 0],
            Self::Brg => [2, 0, 1],
            Self::Bgr => [2, 1, 0],
        }
    }

    /// Color channel sent in the given wire slot.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not 0, 1 or 2.
    #[inline]
    pub const fn channel(self, slot: usize) -> usize {
        debug_assert!(slot < 3, "wire slot out of range");
        self.offsets()[slot]
    }
}

#[derive(Debug, Clone, Copy)]
enum Source<'a> {
    Pixels(&'a [Rgb]),
    Bytes { data: &'a [u8], stride: usize },
    Solid(Rgb),
}

impl Source<'_> {
    #[inline]
    fn byte(&self, position: usize, channel: usize) -> u8 {
        match self {
            Self::Pixels(pixels) => channel_of(pixels[position], channel),
            Self::Bytes { data, stride } => data[position * stride + channel],
            Self::Solid(color) => channel_of(*color, channel),
        }
    }
}

#[inline]
const fn channel_of(color: Rgb, channel: usize) -> u8 {
    match channel {
        0 => color.r,
        1 => color.g,
        _ => color.b,
    }
}

/// Cursor over the pixels of one frame.
///
/// Slots are wire positions: slot 0 is the first byte the strip receives
/// for a pixel. The stream is cheap to clone, so an encoder can restart a
/// frame from a saved copy.
#[derive(Debug, Clone)]
pub struct PixelStream<'a> {
    source: Source<'a>,
    position: usize,
    len: usize,
    remaining: usize,
    order: ChannelOrder,
    scale: [u8; 3],
    dither: DitherState,
}

impl<'a> PixelStream<'a> {
    /// Stream over a pixel buffer.
    pub fn from_pixels(pixels: &'a [Rgb], order: ChannelOrder, scale: Rgb) -> Self {
        Self::with_source(Source::Pixels(pixels), pixels.len(), order, scale)
    }

    /// Stream over raw bytes where each pixel is followed by `skip` unused bytes.
    pub fn from_bytes(data: &'a [u8], skip: usize, order: ChannelOrder, scale: Rgb) -> Result<Self> {
        let stride = 3 + skip;
        // The last pixel's trailing bytes may be cut off.
        let len = (data.len() + skip) / stride;
        if len == 0 {
            return Err(Error::EmptyStrip);
        }
        Ok(Self::with_source(
            Source::Bytes { data, stride },
            len,
            order,
            scale,
        ))
    }

    /// Stream that repeats one color `len` times.
    pub fn solid(color: Rgb, len: usize, order: ChannelOrder, scale: Rgb) -> Self {
        Self::with_source(Source::Solid(color), len, order, scale)
    }

    fn with_source(source: Source<'a>, len: usize, order: ChannelOrder, scale: Rgb) -> Self {
        Self {
            source,
            position: 0,
            len,
            remaining: len,
            order,
            scale: [scale.r, scale.g, scale.b],
            dither: DitherState::DISABLED,
        }
    }

    /// Enable dithering for this frame, advancing the strip's dither counter.
    #[must_use]
    pub fn dithered(mut self, mode: DitherMode, counter: &mut DitherCounter) -> Self {
        self.dither = match mode {
            DitherMode::Disabled => DitherState::DISABLED,
            DitherMode::Binary => DitherState::new(counter.next_phase(), self.scale()),
        };
        self
    }

    /// Whether at least `n` pixels remain.
    #[inline]
    pub const fn has(&self, n: usize) -> bool {
        self.remaining >= n
    }

    /// Total pixels in the frame.
    #[inline]
    pub const fn size(&self) -> usize {
        self.len
    }

    /// Pixels not yet consumed.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.remaining
    }

    /// Channel order of the strip.
    #[inline]
    pub const fn order(&self) -> ChannelOrder {
        self.order
    }

    /// Per-channel scale in red, green, blue order.
    #[inline]
    pub const fn scale(&self) -> Rgb {
        Rgb {
            r: self.scale[0],
            g: self.scale[1],
            b: self.scale[2],
        }
    }

    /// Scale applied to the given wire slot.
    #[inline]
    pub const fn scale_for(&self, slot: usize) -> u8 {
        self.scale[self.order.channel(slot)]
    }

    /// Current dither offset of the given wire slot.
    #[inline]
    pub const fn dither_for(&self, slot: usize) -> u8 {
        self.dither.offset(self.order.channel(slot))
    }

    /// Raw byte of the current pixel in the given wire slot.
    ///
    /// # Panics
    ///
    /// Panics if the stream is exhausted or `slot` is above 2.
    #[inline]
    pub fn load(&self, slot: usize) -> u8 {
        debug_assert!(self.has(1), "load past the end of the stream");
        self.source.byte(self.position, self.order.channel(slot))
    }

    /// Add the slot's dither offset. Zero stays zero.
    #[inline]
    pub const fn dither(&self, slot: usize, byte: u8) -> u8 {
        if byte == 0 {
            0
        } else {
            qadd8(byte, self.dither_for(slot))
        }
    }

    /// Scale a byte by the slot's adjustment.
    #[inline]
    pub const fn scale_byte(&self, slot: usize, byte: u8) -> u8 {
        scale8(byte, self.scale_for(slot))
    }

    /// Load, dither and scale the current pixel's byte for a slot.
    #[inline]
    pub fn load_and_scale(&self, slot: usize) -> u8 {
        self.scale_byte(slot, self.dither(slot, self.load(slot)))
    }

    /// Like [`Self::load_and_scale`] but with an explicit scale.
    #[inline]
    pub fn load_and_scale_with(&self, slot: usize, scale: u8) -> u8 {
        scale8(self.dither(slot, self.load(slot)), scale)
    }

    /// Move to the next pixel. A solid stream keeps reading the same color.
    #[inline]
    pub fn advance(&mut self) {
        if !matches!(self.source, Source::Solid(_)) {
            self.position += 1;
        }
        self.remaining = self.remaining.saturating_sub(1);
    }

    /// Flip the dither offsets for the next pixel.
    #[inline]
    pub fn step_dithering(&mut self) {
        self.dither.step_all();
    }
}

impl Iterator for PixelStream<'_> {
    type Item = [u8; 3];

    /// Produce the next pixel's three wire bytes, fully adjusted.
    fn next(&mut self) -> Option<Self::Item> {
        if !self.has(1) {
            return None;
        }
        let bytes = [
            self.load_and_scale(0),
            self.load_and_scale(1),
            self.load_and_scale(2),
        ];
        self.advance();
        self.step_dithering();
        Some(bytes)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for PixelStream<'_> {}
