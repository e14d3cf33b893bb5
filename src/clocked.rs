//! Clocked (SPI-style) strips.
//!
//! These chipsets sample a data line on the edges of a separate clock line,
//! so timing only bounds the clock rate. What differs per chipset is the
//! framing: start and end boundaries, per-pixel headers and how the color
//! bytes are packed.

use embassy_time::{Duration, Instant};
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;
use log::debug;

use crate::controller::LedController;
use crate::error::{Error, FrameStatus, Result};
use crate::stream::{ChannelOrder, PixelStream};
use crate::timing::{TimingPort, ns_to_cycles};

/// Minimum time the clock line stays high on a bit-banged bus.
pub const MIN_CLOCK_HIGH_NS: u32 = 35;

/// Byte-oriented serial output used by clocked strips.
pub trait ClockedBus {
    /// Bring the bus lines to their idle state.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Start a transfer.
    fn select(&mut self) -> Result<()> {
        Ok(())
    }

    /// Finish a transfer.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }

    /// Shift out one byte, MSB first.
    fn write_byte(&mut self, byte: u8) -> Result<()>;

    /// Shift out a 16-bit word, high byte first.
    fn write_word(&mut self, word: u16) -> Result<()> {
        let [high, low] = word.to_be_bytes();
        self.write_byte(high)?;
        self.write_byte(low)
    }

    /// Shift out the same byte `count` times.
    fn write_repeated(&mut self, byte: u8, count: usize) -> Result<()> {
        for _ in 0..count {
            self.write_byte(byte)?;
        }
        Ok(())
    }

    /// Whether [`Self::write_bit`] is available.
    fn supports_bit_writes(&self) -> bool {
        false
    }

    /// Shift out a single bit.
    fn write_bit(&mut self, _bit: bool) -> Result<()> {
        Err(Error::BitWriteUnsupported)
    }

    /// Block until every queued byte left the bus.
    fn wait_fully(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Hardware SPI peripheral driving the strip.
///
/// Only the clock and MOSI lines are used; strips have no chip select.
pub struct HardwareSpi<S> {
    bus: S,
}

impl<S: SpiBus<u8>> HardwareSpi<S> {
    pub const fn new(bus: S) -> Self {
        Self { bus }
    }

    pub fn release_bus(self) -> S {
        self.bus
    }
}

impl<S: SpiBus<u8>> ClockedBus for HardwareSpi<S> {
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.bus.write(&[byte]).map_err(|_| Error::Bus)
    }

    fn write_word(&mut self, word: u16) -> Result<()> {
        self.bus.write(&word.to_be_bytes()).map_err(|_| Error::Bus)
    }

    fn write_repeated(&mut self, byte: u8, count: usize) -> Result<()> {
        let chunk = [byte; 16];
        let mut left = count;
        while left > 0 {
            let len = left.min(chunk.len());
            self.bus.write(&chunk[..len]).map_err(|_| Error::Bus)?;
            left -= len;
        }
        Ok(())
    }

    fn wait_fully(&mut self) -> Result<()> {
        self.bus.flush().map_err(|_| Error::Bus)
    }
}

/// Software SPI toggling two GPIO pins.
pub struct BitBangSpi<D, C, T> {
    data: D,
    clock: C,
    port: T,
    high_cycles: u32,
    low_cycles: u32,
}

impl<D: OutputPin, C: OutputPin, T: TimingPort> BitBangSpi<D, C, T> {
    /// Create a bus clocked at roughly `data_rate_hz`.
    ///
    /// Delays are computed here once from the port's clock.
    pub fn new(data: D, clock: C, port: T, data_rate_hz: u32) -> Result<Self> {
        if data_rate_hz == 0 {
            return Err(Error::InvalidTiming);
        }
        let cycles_per_second = u64::from(port.cycles_per_us()) * 1_000_000;
        let half_period =
            u32::try_from(cycles_per_second / (2 * u64::from(data_rate_hz))).unwrap_or(u32::MAX);
        let min_high = ns_to_cycles(MIN_CLOCK_HIGH_NS, port.cycles_per_us());
        Ok(Self {
            data,
            clock,
            port,
            high_cycles: half_period.max(min_high),
            low_cycles: half_period,
        })
    }

    /// Release the pins and timing port.
    pub fn release_pins(self) -> (D, C, T) {
        (self.data, self.clock, self.port)
    }

    fn strobe(&mut self, bit: bool) -> Result<()> {
        if bit {
            self.data.set_high().map_err(|_| Error::Pin)?;
        } else {
            self.data.set_low().map_err(|_| Error::Pin)?;
        }
        self.clock.set_high().map_err(|_| Error::Pin)?;
        self.port.busy_wait_cycles(self.high_cycles);
        self.clock.set_low().map_err(|_| Error::Pin)?;
        self.port.busy_wait_cycles(self.low_cycles);
        Ok(())
    }
}

impl<D: OutputPin, C: OutputPin, T: TimingPort> ClockedBus for BitBangSpi<D, C, T> {
    fn init(&mut self) -> Result<()> {
        self.data.set_low().map_err(|_| Error::Pin)?;
        self.clock.set_low().map_err(|_| Error::Pin)
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        for shift in (0..8).rev() {
            self.strobe((byte >> shift) & 1 != 0)?;
        }
        Ok(())
    }

    fn supports_bit_writes(&self) -> bool {
        true
    }

    fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.strobe(bit)
    }
}

/// Framing protocol of a clocked chipset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockedChipset {
    /// APA102 / DotStar
    Apa102,
    Sk9822,
    Ws2801,
    Ws2803,
    Lpd8806,
    Lpd6803,
    P9813,
    Sm16716,
}

impl ClockedChipset {
    /// Clock rate the chipset is usually driven at.
    pub const fn default_data_rate_hz(self) -> u32 {
        match self {
            Self::Apa102 | Self::Lpd8806 | Self::Lpd6803 => 12_000_000,
            Self::Sk9822 => 24_000_000,
            Self::Ws2801 => 1_000_000,
            Self::Ws2803 => 25_000_000,
            Self::P9813 => 10_000_000,
            Self::Sm16716 => 16_000_000,
        }
    }

    /// Idle time between frames needed to latch, in microseconds.
    pub const fn latch_us(self) -> u64 {
        match self {
            Self::Ws2801 | Self::Ws2803 => 1000,
            _ => 0,
        }
    }

    /// Whether the framing needs single-bit writes.
    pub const fn needs_bit_writes(self) -> bool {
        matches!(self, Self::Sm16716)
    }
}

/// Configuration of a clocked strip.
#[derive(Debug, Clone, Copy)]
pub struct ClockedConfig {
    pub chipset: ClockedChipset,
    pub order: ChannelOrder,
    /// Use the 5-bit per-pixel brightness of APA102-class chips to carry
    /// the global scale, keeping more color resolution at low brightness.
    pub global_brightness: bool,
    /// Refresh ceiling in Hz, 0 for none.
    pub max_refresh_rate: u16,
}

impl ClockedConfig {
    pub const fn new(chipset: ClockedChipset, order: ChannelOrder) -> Self {
        Self {
            chipset,
            order,
            global_brightness: false,
            max_refresh_rate: 0,
        }
    }
}

/// Clocked strip on a [`ClockedBus`].
pub struct ClockedController<B> {
    bus: B,
    config: ClockedConfig,
    last_frame: Option<Instant>,
}

impl<B: ClockedBus> ClockedController<B> {
    pub fn new(bus: B, config: ClockedConfig) -> Result<Self> {
        if config.chipset.needs_bit_writes() && !bus.supports_bit_writes() {
            return Err(Error::BitWriteUnsupported);
        }
        Ok(Self {
            bus,
            config,
            last_frame: None,
        })
    }

    pub fn release(self) -> B {
        self.bus
    }

    fn wait_for_latch(&self) {
        let latch = Duration::from_micros(self.config.chipset.latch_us());
        if latch.as_ticks() == 0 {
            return;
        }
        if let Some(last) = self.last_frame {
            while last.elapsed() < latch {
                core::hint::spin_loop();
            }
        }
    }

    fn write_apa102(&mut self, mut pixels: PixelStream<'_>, end_byte: u8) -> Result<()> {
        let mut scales = [pixels.scale_for(0), pixels.scale_for(1), pixels.scale_for(2)];
        let mut brightness = 0x1F;
        if self.config.global_brightness {
            (brightness, scales) = global_brightness(scales);
        }

        self.bus.select()?;
        self.bus.write_word(0)?;
        self.bus.write_word(0)?;
        while pixels.has(1) {
            self.bus.write_byte(0xE0 | brightness)?;
            for (slot, scale) in scales.into_iter().enumerate() {
                self.bus.write_byte(pixels.load_and_scale_with(slot, scale))?;
            }
            pixels.step_dithering();
            pixels.advance();
        }
        for _ in 0..=pixels.size() / 32 {
            self.bus.write_byte(end_byte)?;
            self.bus.write_repeated(0, 3)?;
        }
        self.bus.wait_fully()?;
        self.bus.release()
    }

    fn write_plain(&mut self, pixels: PixelStream<'_>, adjust: fn(u8) -> u8) -> Result<()> {
        self.bus.select()?;
        for bytes in pixels {
            for byte in bytes {
                self.bus.write_byte(adjust(byte))?;
            }
        }
        Ok(())
    }

    fn write_lpd6803(&mut self, pixels: PixelStream<'_>) -> Result<()> {
        self.bus.select()?;
        self.bus.write_repeated(0, 4)?;
        for [r, g, b] in pixels {
            let word = 0x8000
                | (u16::from(r & 0xF8) << 7)
                | (u16::from(g & 0xF8) << 2)
                | u16::from(b >> 3);
            self.bus.write_word(word)?;
        }
        self.bus.wait_fully()?;
        self.bus.release()
    }

    fn write_p9813(&mut self, pixels: PixelStream<'_>) -> Result<()> {
        self.bus.select()?;
        self.bus.write_repeated(0, 4)?;
        for [r, g, b] in pixels {
            self.bus.write_byte(p9813_flag(r, g, b))?;
            self.bus.write_byte(b)?;
            self.bus.write_byte(g)?;
            self.bus.write_byte(r)?;
        }
        self.bus.write_repeated(0, 4)?;
        self.bus.wait_fully()?;
        self.bus.release()
    }

    fn write_sm16716(&mut self, pixels: PixelStream<'_>) -> Result<()> {
        self.bus.select()?;
        for bytes in pixels {
            self.bus.write_bit(true)?;
            for byte in bytes {
                self.bus.write_byte(byte)?;
            }
        }
        self.bus.release()?;

        // 50 zero bits close the frame.
        self.bus.select()?;
        self.bus.write_repeated(0, 6)?;
        self.bus.wait_fully()?;
        self.bus.write_bit(false)?;
        self.bus.write_bit(false)?;
        self.bus.release()
    }
}

impl<B: ClockedBus> LedController for ClockedController<B> {
    fn init(&mut self) -> Result<()> {
        self.bus.init()
    }

    fn show_pixels(&mut self, pixels: PixelStream<'_>) -> Result<FrameStatus> {
        let len = pixels.size();
        match self.config.chipset {
            ClockedChipset::Apa102 => self.write_apa102(pixels, 0xFF)?,
            ClockedChipset::Sk9822 => self.write_apa102(pixels, 0x00)?,
            ClockedChipset::Ws2801 | ClockedChipset::Ws2803 => {
                self.wait_for_latch();
                self.write_plain(pixels, core::convert::identity)?;
                self.bus.wait_fully()?;
                self.bus.release()?;
                self.last_frame = Some(Instant::now());
            }
            ClockedChipset::Lpd8806 => {
                self.write_plain(pixels, lpd8806_adjust)?;
                self.bus.write_repeated(0, (len * 3 + 63) >> 6)?;
                self.bus.wait_fully()?;
                self.bus.release()?;
            }
            ClockedChipset::Lpd6803 => self.write_lpd6803(pixels)?,
            ClockedChipset::P9813 => self.write_p9813(pixels)?,
            ClockedChipset::Sm16716 => self.write_sm16716(pixels)?,
        }
        debug!("clocked frame of {} pixels sent", len);
        Ok(FrameStatus::Shown)
    }

    fn channel_order(&self) -> ChannelOrder {
        self.config.order
    }

    fn max_refresh_rate(&self) -> u16 {
        self.config.max_refresh_rate
    }
}

/// Move the common part of the channel scales into the 5-bit brightness
/// field, returning the field and the rescaled channel scales.
#[allow(clippy::cast_possible_truncation)]
pub fn global_brightness(scales: [u8; 3]) -> (u8, [u8; 3]) {
    const MAX_BRIGHTNESS: u16 = 0x1F;
    let max_scale = u16::from(scales[0].max(scales[1]).max(scales[2]));
    let brightness = (((max_scale + 1) * MAX_BRIGHTNESS - 1) >> 8) + 1;
    let rescale = |scale: u8| {
        let value = (MAX_BRIGHTNESS * u16::from(scale) + (brightness >> 1)) / brightness;
        value.min(255) as u8
    };
    (
        brightness as u8,
        [rescale(scales[0]), rescale(scales[1]), rescale(scales[2])],
    )
}

/// LPD8806 takes 7-bit channels with the high bit set.
#[inline]
pub const fn lpd8806_adjust(byte: u8) -> u8 {
    let round = if byte != 0 && byte < 254 { 1 } else { 0 };
    ((byte >> 1) | 0x80) + round
}

/// P9813 flag byte: inverted top two bits of each channel.
#[inline]
pub const fn p9813_flag(r: u8, g: u8, b: u8) -> u8 {
    0xC0 | ((!b & 0xC0) >> 2) | ((!g & 0xC0) >> 4) | ((!r & 0xC0) >> 6)
}
