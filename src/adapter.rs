//! Bridge to third-party `smart-leds` writers.
//!
//! Many HALs ship their own WS2812 drivers (RMT, PIO, SPI tricks) behind
//! [`SmartLedsWrite`]. Wrapping one in [`SmartLedsController`] lets it join
//! a driver chain while brightness, correction and dithering still happen
//! here.

use core::iter;

use smart_leds::SmartLedsWrite;

use crate::color::{BLACK, Rgb};
use crate::controller::LedController;
use crate::error::{Error, FrameStatus, Result};
use crate::stream::{ChannelOrder, PixelStream};

/// [`LedController`] on top of a [`SmartLedsWrite`] implementation.
pub struct SmartLedsController<W> {
    writer: W,
    skip_leds: usize,
    max_refresh_rate: u16,
}

impl<W> SmartLedsController<W>
where
    W: SmartLedsWrite<Color = Rgb>,
{
    pub const fn new(writer: W) -> Self {
        Self {
            writer,
            skip_leds: 0,
            max_refresh_rate: 0,
        }
    }

    /// Keep the first `skip_leds` physical pixels dark.
    ///
    /// Useful when the strip starts with a sacrificial level-shifter pixel.
    #[must_use]
    pub const fn with_skip(mut self, skip_leds: usize) -> Self {
        self.skip_leds = skip_leds;
        self
    }

    #[must_use]
    pub const fn with_max_refresh_rate(mut self, hz: u16) -> Self {
        self.max_refresh_rate = hz;
        self
    }

    pub fn release(self) -> W {
        self.writer
    }
}

impl<W> LedController for SmartLedsController<W>
where
    W: SmartLedsWrite<Color = Rgb>,
{
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn show_pixels(&mut self, pixels: PixelStream<'_>) -> Result<FrameStatus> {
        // The writer applies its own wire order, bytes arrive as r, g, b.
        let colors = pixels.map(|[r, g, b]| Rgb::new(r, g, b));
        let frame = iter::repeat_n(BLACK, self.skip_leds).chain(colors);
        critical_section::with(|_| self.writer.write(frame)).map_err(|_| Error::Bus)?;
        Ok(FrameStatus::Shown)
    }

    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }

    fn max_refresh_rate(&self) -> u16 {
        self.max_refresh_rate
    }
}
