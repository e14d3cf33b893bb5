use crate::color::Rgb;
use crate::error::{FrameStatus, Result};
use crate::stream::{ChannelOrder, PixelStream};

/// Abstract LED strip controller
///
/// Implement this trait to support a new chipset or output peripheral.
/// The driver chain only ever talks to strips through it.
pub trait LedController {
    /// Put the output into its idle state.
    ///
    /// Called once when the strip is attached.
    fn init(&mut self) -> Result<()>;

    /// Push one frame of pixels to the strip.
    ///
    /// Timing problems are reported through [`FrameStatus`]; errors are
    /// reserved for hardware failures.
    fn show_pixels(&mut self, pixels: PixelStream<'_>) -> Result<FrameStatus>;

    /// Order in which the strip expects the color channels.
    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }

    /// Highest refresh rate the strip supports in Hz, 0 for no limit.
    fn max_refresh_rate(&self) -> u16 {
        0
    }

    /// Show a buffer with the given per-channel scale and no dithering.
    fn show(&mut self, pixels: &[Rgb], scale: Rgb) -> Result<FrameStatus> {
        let order = self.channel_order();
        self.show_pixels(PixelStream::from_pixels(pixels, order, scale))
    }

    /// Fill `len` pixels with one color.
    fn show_color(&mut self, color: Rgb, len: usize, scale: Rgb) -> Result<FrameStatus> {
        let order = self.channel_order();
        self.show_pixels(PixelStream::solid(color, len, order, scale))
    }
}
