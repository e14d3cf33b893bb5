//! Driver chain.
//!
//! An ordered, fixed-capacity list of attached strips. Each entry borrows
//! its controller exclusively and shares the caller's pixel buffer through
//! a `RefCell`, so the application keeps writing colors between frames
//! while the chain reads them at show time.

use core::cell::{Ref, RefCell};

use heapless::Vec;
use log::{debug, warn};

use crate::adjustment::compute_adjustment;
use crate::color::{BLACK, Rgb, WHITE};
use crate::controller::LedController;
use crate::dither::{DitherCounter, DitherMode};
use crate::error::{Error, FrameStatus, Result};
use crate::stream::PixelStream;

/// Strips a chain holds unless told otherwise.
pub const DEFAULT_CAPACITY: usize = 8;

/// Identifies an attached strip across attach and detach calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StripHandle(u16);

/// Per-strip color settings applied when a strip is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripSettings {
    pub dither: DitherMode,
    pub correction: Rgb,
    pub temperature: Rgb,
}

impl Default for StripSettings {
    fn default() -> Self {
        Self {
            dither: DitherMode::Binary,
            correction: WHITE,
            temperature: WHITE,
        }
    }
}

/// One attached strip.
pub struct StripNode<'a> {
    handle: StripHandle,
    controller: &'a mut dyn LedController,
    buffer: &'a RefCell<[Rgb]>,
    offset: usize,
    len: usize,
    settings: StripSettings,
    counter: DitherCounter,
}

impl<'a> StripNode<'a> {
    pub const fn handle(&self) -> StripHandle {
        self.handle
    }

    /// Number of pixels on the strip.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Strips are never attached empty.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Position of the strip's first pixel in the shared buffer.
    pub const fn offset(&self) -> usize {
        self.offset
    }

    pub fn controller(&self) -> &dyn LedController {
        &*self.controller
    }

    /// Borrow the strip's pixels.
    pub fn leds(&self) -> Result<Ref<'a, [Rgb]>> {
        let buffer: &'a RefCell<[Rgb]> = self.buffer;
        let range = self.offset..self.offset + self.len;
        buffer
            .try_borrow()
            .map(|leds| Ref::map(leds, |leds| &leds[range]))
            .map_err(|_| Error::BufferBusy)
    }

    /// Set every pixel of the strip to black in the buffer.
    pub fn clear_leds(&self) -> Result<()> {
        let mut leds = self.buffer.try_borrow_mut().map_err(|_| Error::BufferBusy)?;
        leds[self.offset..self.offset + self.len].fill(BLACK);
        Ok(())
    }

    pub const fn settings(&self) -> &StripSettings {
        &self.settings
    }

    pub const fn dither(&self) -> DitherMode {
        self.settings.dither
    }

    pub fn set_dither(&mut self, mode: DitherMode) {
        self.settings.dither = mode;
    }

    pub const fn correction(&self) -> Rgb {
        self.settings.correction
    }

    pub fn set_correction(&mut self, correction: impl Into<Rgb>) {
        self.settings.correction = correction.into();
    }

    pub const fn temperature(&self) -> Rgb {
        self.settings.temperature
    }

    pub fn set_temperature(&mut self, temperature: impl Into<Rgb>) {
        self.settings.temperature = temperature.into();
    }

    /// Per-channel scale for a global brightness.
    pub const fn adjustment(&self, brightness: u8) -> Rgb {
        compute_adjustment(brightness, self.settings.correction, self.settings.temperature)
    }

    /// Highest refresh rate the controller supports, 0 for no limit.
    pub fn max_refresh_rate(&self) -> u16 {
        self.controller.max_refresh_rate()
    }

    /// Push the buffer to the strip.
    pub fn show_leds(&mut self, brightness: u8) -> Result<FrameStatus> {
        self.show_leds_with(brightness, self.settings.dither)
    }

    pub(crate) fn show_leds_with(
        &mut self,
        brightness: u8,
        dither: DitherMode,
    ) -> Result<FrameStatus> {
        let scale = self.adjustment(brightness);
        let leds = self.leds()?;
        let pixels = PixelStream::from_pixels(&leds, self.controller.channel_order(), scale)
            .dithered(dither, &mut self.counter);
        self.controller.show_pixels(pixels)
    }

    /// Fill the strip with one color, leaving the buffer untouched.
    pub fn show_color(&mut self, color: Rgb, brightness: u8) -> Result<FrameStatus> {
        self.show_color_with(color, brightness, self.settings.dither)
    }

    pub(crate) fn show_color_with(
        &mut self,
        color: Rgb,
        brightness: u8,
        dither: DitherMode,
    ) -> Result<FrameStatus> {
        let scale = self.adjustment(brightness);
        let pixels = PixelStream::solid(color, self.len, self.controller.channel_order(), scale)
            .dithered(dither, &mut self.counter);
        self.controller.show_pixels(pixels)
    }
}

/// Ordered collection of attached strips.
pub struct DriverChain<'a, const N: usize = DEFAULT_CAPACITY> {
    nodes: Vec<StripNode<'a>, N>,
    next_handle: u16,
}

impl<'a, const N: usize> DriverChain<'a, N> {
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            next_handle: 0,
        }
    }

    /// Attach a strip covering the whole buffer.
    pub fn attach(
        &mut self,
        controller: &'a mut dyn LedController,
        buffer: &'a RefCell<[Rgb]>,
        settings: StripSettings,
    ) -> Result<StripHandle> {
        let len = buffer.try_borrow().map_err(|_| Error::BufferBusy)?.len();
        self.attach_range(controller, buffer, 0, len, settings)
    }

    /// Attach a strip covering `len` pixels of the buffer starting at `offset`.
    ///
    /// The controller is initialized before the strip joins the chain.
    pub fn attach_range(
        &mut self,
        controller: &'a mut dyn LedController,
        buffer: &'a RefCell<[Rgb]>,
        offset: usize,
        len: usize,
        settings: StripSettings,
    ) -> Result<StripHandle> {
        if len == 0 {
            return Err(Error::EmptyStrip);
        }
        let buffer_len = buffer.try_borrow().map_err(|_| Error::BufferBusy)?.len();
        if offset.checked_add(len).is_none_or(|end| end > buffer_len) {
            return Err(Error::RangeOutOfBounds);
        }
        if self.nodes.is_full() {
            warn!("driver chain is full, {} strips attached", N);
            return Err(Error::CapacityExceeded);
        }

        controller.init()?;

        let handle = StripHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        let node = StripNode {
            handle,
            controller,
            buffer,
            offset,
            len,
            settings,
            counter: DitherCounter::new(),
        };
        if self.nodes.push(node).is_err() {
            return Err(Error::CapacityExceeded);
        }
        debug!("strip {} attached: {} pixels at {}", handle.0, len, offset);
        Ok(handle)
    }

    /// Remove a strip, keeping the order of the others.
    pub fn detach(&mut self, handle: StripHandle) -> Result<()> {
        let index = self.position(handle).ok_or(Error::UnknownStrip)?;
        self.nodes.remove(index);
        debug!("strip {} detached", handle.0);
        Ok(())
    }

    fn position(&self, handle: StripHandle) -> Option<usize> {
        self.nodes.iter().position(|node| node.handle == handle)
    }

    pub fn node(&self, handle: StripHandle) -> Option<&StripNode<'a>> {
        self.nodes.iter().find(|node| node.handle == handle)
    }

    pub fn node_mut(&mut self, handle: StripHandle) -> Option<&mut StripNode<'a>> {
        self.nodes.iter_mut().find(|node| node.handle == handle)
    }

    /// Number of attached strips.
    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Strip at `index` in attachment order.
    pub fn get(&self, index: usize) -> Option<&StripNode<'a>> {
        self.nodes.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut StripNode<'a>> {
        self.nodes.get_mut(index)
    }

    /// Strip at `index`, falling back to the first strip when out of range.
    ///
    /// Returns `None` only for an empty chain. Prefer [`Self::get`] when an
    /// out-of-range index is a bug.
    pub fn at(&self, index: usize) -> Option<&StripNode<'a>> {
        self.nodes.get(index).or_else(|| self.nodes.first())
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut StripNode<'a>> {
        let index = if index < self.nodes.len() { index } else { 0 };
        self.nodes.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StripNode<'a>> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StripNode<'a>> {
        self.nodes.iter_mut()
    }

    /// Visit every strip in attachment order.
    pub fn for_each(&self, f: impl FnMut(&StripNode<'a>)) {
        self.nodes.iter().for_each(f);
    }

    pub fn for_each_mut(&mut self, f: impl FnMut(&mut StripNode<'a>)) {
        self.nodes.iter_mut().for_each(f);
    }

    /// Tightest refresh ceiling among the attached strips, 0 for none.
    pub fn min_refresh_rate(&self) -> u16 {
        self.nodes
            .iter()
            .map(StripNode::max_refresh_rate)
            .filter(|&hz| hz > 0)
            .min()
            .unwrap_or(0)
    }
}

impl<const N: usize> Default for DriverChain<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}
