//! Single-wire ("clockless") waveform encoder.
//!
//! Every bit is a pulse on one data line: the line goes active at the start
//! of the bit cycle, falls after `T1` for a zero or after `T1 + T2` for a
//! one, and stays idle until the cycle ends at `T1 + T2 + T3`. The strip
//! latches the frame once the line has been idle for the reset period.
//!
//! The encoder runs the waveform against a [`TimingPort`] deadline by
//! deadline. When interrupts are allowed between pixels, a long interrupt
//! can leave the line idle long enough for the strip to latch half a frame;
//! that is detected at the next pixel boundary and handled according to
//! the configured [`OverrunPolicy`].

use embedded_hal::digital::OutputPin;
use log::{debug, warn};

use crate::controller::LedController;
use crate::error::{Error, FrameStatus, Result};
use crate::stream::{ChannelOrder, PixelStream};
use crate::timing::{TimingPort, deadline_reached, elapsed_cycles, ns_to_cycles};

/// Default retries after an overrun before the frame is dropped.
pub const DEFAULT_FRAME_RETRIES: u8 = 2;

/// Margin subtracted from the reset period when detecting overruns.
pub const INTERRUPT_THRESHOLD_US: u32 = 1;

/// Refresh ceiling reported by clockless strips unless configured otherwise.
pub const DEFAULT_MAX_REFRESH_RATE: u16 = 400;

/// Bit timing of a clockless chipset, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSpec {
    /// Active time common to both bit values.
    pub t1_ns: u32,
    /// Additional active time of a one bit.
    pub t2_ns: u32,
    /// Idle tail of a one bit.
    pub t3_ns: u32,
    /// Zero bits appended after every data byte.
    pub extra_bits: u8,
    /// Idle time that makes the strip latch the frame.
    pub reset_us: u32,
    /// Idle level of the line is high and pulses are low.
    pub inverted: bool,
}

impl TimingSpec {
    pub const WS2812: Self = Self::new(250, 625, 375);
    pub const WS2811: Self = Self::new(320, 320, 640);
    pub const WS2811_400KHZ: Self = Self::new(800, 800, 900);
    pub const WS2813: Self = Self::new(320, 320, 640).with_reset_us(300);
    pub const SK6812: Self = Self::new(300, 300, 600);
    pub const SK6822: Self = Self::new(375, 1000, 375);
    pub const SM16703: Self = Self::new(300, 600, 300);
    pub const PL9823: Self = Self::new(350, 1010, 350);
    pub const TM1809: Self = Self::new(350, 350, 450);
    pub const TM1803: Self = Self::new(700, 1100, 700);
    pub const TM1829: Self = Self::new(340, 340, 550).with_reset_us(500).inverted();
    pub const UCS1903: Self = Self::new(500, 1500, 500);
    pub const UCS1903B: Self = Self::new(400, 450, 450);
    pub const UCS1904: Self = Self::new(400, 400, 450);
    pub const UCS2903: Self = Self::new(250, 750, 250);
    pub const GE8822: Self = Self::new(350, 660, 350).with_extra_bits(4);
    pub const LPD1886: Self = Self::new(200, 400, 200).with_extra_bits(4);
    pub const GW6205: Self = Self::new(400, 400, 400).with_extra_bits(4);
    pub const GW6205_400KHZ: Self = Self::new(800, 800, 800).with_extra_bits(4);

    /// Timing with a 50 µs reset period and normal polarity.
    pub const fn new(t1_ns: u32, t2_ns: u32, t3_ns: u32) -> Self {
        Self {
            t1_ns,
            t2_ns,
            t3_ns,
            extra_bits: 0,
            reset_us: 50,
            inverted: false,
        }
    }

    #[must_use]
    pub const fn with_reset_us(mut self, reset_us: u32) -> Self {
        self.reset_us = reset_us;
        self
    }

    #[must_use]
    pub const fn with_extra_bits(mut self, extra_bits: u8) -> Self {
        self.extra_bits = extra_bits;
        self
    }

    #[must_use]
    pub const fn inverted(mut self) -> Self {
        self.inverted = true;
        self
    }

    /// Full bit period in nanoseconds.
    pub const fn period_ns(&self) -> u32 {
        self.t1_ns + self.t2_ns + self.t3_ns
    }
}

/// [`TimingSpec`] converted to counter cycles for one clock rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClocklessTiming {
    pub t1: u32,
    pub t2: u32,
    pub t3: u32,
    pub period: u32,
    pub extra_bits: u8,
    pub reset: u32,
    pub overrun_threshold: u32,
    pub inverted: bool,
}

impl ClocklessTiming {
    /// Convert nanosecond timing into cycles, rounding every phase up.
    pub fn new(spec: &TimingSpec, cycles_per_us: u32) -> Result<Self> {
        let t1 = ns_to_cycles(spec.t1_ns, cycles_per_us);
        let t2 = ns_to_cycles(spec.t2_ns, cycles_per_us);
        let t3 = ns_to_cycles(spec.t3_ns, cycles_per_us);
        if t1 == 0 || t1 + t2 + t3 == 0 {
            return Err(Error::InvalidTiming);
        }
        Ok(Self {
            t1,
            t2,
            t3,
            period: t1 + t2 + t3,
            extra_bits: spec.extra_bits,
            reset: spec.reset_us.saturating_mul(cycles_per_us),
            overrun_threshold: spec
                .reset_us
                .saturating_sub(INTERRUPT_THRESHOLD_US)
                .saturating_mul(cycles_per_us),
            inverted: spec.inverted,
        })
    }

    /// Active time of a bit.
    #[inline]
    pub const fn high_time(&self, bit: bool) -> u32 {
        if bit { self.t1 + self.t2 } else { self.t1 }
    }
}

/// Where interrupts may run while a frame is on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptMode {
    /// The whole frame runs inside one critical section.
    Masked,
    /// Each pixel runs inside its own critical section.
    #[default]
    BetweenPixels,
}

/// What to do when the line idled long enough to latch mid-frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrunPolicy {
    /// Abort and resend the frame, dropping it after the retry budget.
    #[default]
    Retry,
    /// Carry on with the rest of the frame.
    BestEffort,
}

/// Phase of the waveform generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaveState {
    /// Line idle between frames.
    #[default]
    Idle,
    /// Active part of a bit.
    High,
    /// Idle tail of a zero bit.
    LowForZero,
    /// Idle tail of a one bit.
    LowForOne,
    /// Bit period complete, next bit may start.
    CycleEnd,
}

/// Configuration of a clockless strip.
#[derive(Debug, Clone, Copy)]
pub struct ClocklessConfig {
    pub timing: TimingSpec,
    pub order: ChannelOrder,
    pub interrupts: InterruptMode,
    pub overrun: OverrunPolicy,
    /// Resends after an overrun before the frame is dropped.
    pub retries: u8,
    /// Refresh ceiling in Hz, 0 for none.
    pub max_refresh_rate: u16,
}

impl ClocklessConfig {
    pub const fn new(timing: TimingSpec, order: ChannelOrder) -> Self {
        Self {
            timing,
            order,
            interrupts: InterruptMode::BetweenPixels,
            overrun: OverrunPolicy::Retry,
            retries: DEFAULT_FRAME_RETRIES,
            max_refresh_rate: DEFAULT_MAX_REFRESH_RATE,
        }
    }
}

impl Default for ClocklessConfig {
    fn default() -> Self {
        Self::new(TimingSpec::WS2812, ChannelOrder::Grb)
    }
}

enum Transfer {
    Complete { glitched: bool },
    Aborted,
}

/// Clockless strip on a single output pin.
pub struct ClocklessController<P, T> {
    pin: P,
    port: T,
    config: ClocklessConfig,
    timing: ClocklessTiming,
    state: WaveState,
    next_mark: u32,
    last_frame_end: Option<u32>,
}

impl<P: OutputPin, T: TimingPort> ClocklessController<P, T> {
    /// Create a controller, converting the timing for the port's clock.
    pub fn new(pin: P, port: T, config: ClocklessConfig) -> Result<Self> {
        let timing = ClocklessTiming::new(&config.timing, port.cycles_per_us())?;
        Ok(Self {
            pin,
            port,
            config,
            timing,
            state: WaveState::Idle,
            next_mark: 0,
            last_frame_end: None,
        })
    }

    /// Precomputed cycle timing.
    pub const fn timing(&self) -> &ClocklessTiming {
        &self.timing
    }

    /// Current phase of the waveform generator.
    pub const fn state(&self) -> WaveState {
        self.state
    }

    /// Release the pin and timing port.
    pub fn release(self) -> (P, T) {
        (self.pin, self.port)
    }

    fn drive(&mut self, active: bool) -> Result<()> {
        let high = active != self.timing.inverted;
        let result = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        result.map_err(|_| Error::Pin)
    }

    /// Hold the line idle until the previous frame has latched.
    fn wait_for_latch(&mut self) {
        if let Some(end) = self.last_frame_end {
            let now = self.port.now();
            if elapsed_cycles(end, now) < self.timing.reset {
                self.port.busy_wait_until(end.wrapping_add(self.timing.reset));
            }
        }
    }

    fn write_bit(&mut self, bit: bool) -> Result<()> {
        if !deadline_reached(self.port.now(), self.next_mark) {
            self.port.busy_wait_until(self.next_mark);
        }
        self.state = WaveState::CycleEnd;

        let start = self.port.now();
        self.drive(true)?;
        self.state = WaveState::High;

        self.port
            .busy_wait_until(start.wrapping_add(self.timing.high_time(bit)));
        self.drive(false)?;
        self.state = if bit {
            WaveState::LowForOne
        } else {
            WaveState::LowForZero
        };
        self.next_mark = start.wrapping_add(self.timing.period);
        Ok(())
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        for shift in (0..8).rev() {
            self.write_bit((byte >> shift) & 1 != 0)?;
        }
        for _ in 0..self.timing.extra_bits {
            self.write_bit(false)?;
        }
        Ok(())
    }

    fn write_pixel(&mut self, bytes: [u8; 3]) -> Result<()> {
        for byte in bytes {
            self.write_byte(byte)?;
        }
        Ok(())
    }

    /// Whether the line idled past the latch threshold since the last bit.
    #[allow(clippy::cast_possible_wrap)]
    fn overran(&self) -> bool {
        let late = self.port.now().wrapping_sub(self.next_mark) as i32;
        late > self.timing.overrun_threshold as i32
    }

    fn send_frame(&mut self, pixels: PixelStream<'_>) -> Result<Transfer> {
        match self.config.interrupts {
            InterruptMode::Masked => critical_section::with(|_| self.send_pixels(pixels)),
            InterruptMode::BetweenPixels => self.send_pixels(pixels),
        }
    }

    fn send_pixels(&mut self, pixels: PixelStream<'_>) -> Result<Transfer> {
        let masked_per_pixel = self.config.interrupts == InterruptMode::BetweenPixels;
        let mut glitched = false;
        self.next_mark = self.port.now();

        for (index, bytes) in pixels.enumerate() {
            if index > 0 && self.overran() {
                match self.config.overrun {
                    OverrunPolicy::Retry => return Ok(Transfer::Aborted),
                    OverrunPolicy::BestEffort => {
                        glitched = true;
                        self.next_mark = self.port.now();
                    }
                }
            }
            if masked_per_pixel {
                critical_section::with(|_| self.write_pixel(bytes))?;
            } else {
                self.write_pixel(bytes)?;
            }
        }

        // Let the last bit finish its idle tail.
        self.port.busy_wait_until(self.next_mark);
        Ok(Transfer::Complete { glitched })
    }
}

impl<P: OutputPin, T: TimingPort> LedController for ClocklessController<P, T> {
    fn init(&mut self) -> Result<()> {
        self.drive(false)?;
        self.state = WaveState::Idle;
        Ok(())
    }

    fn show_pixels(&mut self, pixels: PixelStream<'_>) -> Result<FrameStatus> {
        let mut retries = 0;
        loop {
            self.wait_for_latch();
            let transfer = self.send_frame(pixels.clone());
            self.state = WaveState::Idle;
            self.last_frame_end = Some(self.port.now());

            match transfer? {
                Transfer::Complete { glitched: false } => return Ok(FrameStatus::Shown),
                Transfer::Complete { glitched: true } => return Ok(FrameStatus::Glitched),
                Transfer::Aborted if retries < self.config.retries => {
                    retries += 1;
                    debug!("clockless frame overran, retry {}", retries);
                }
                Transfer::Aborted => {
                    warn!("clockless frame dropped after {} retries", retries);
                    return Ok(FrameStatus::Dropped);
                }
            }
        }
    }

    fn channel_order(&self) -> ChannelOrder {
        self.config.order
    }

    fn max_refresh_rate(&self) -> u16 {
        self.config.max_refresh_rate
    }
}
