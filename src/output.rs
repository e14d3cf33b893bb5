use core::cell::{Ref, RefCell};

use embassy_time::{Duration, Instant};
use heapless::Vec;
use log::warn;

use crate::chain::{DEFAULT_CAPACITY, DriverChain, StripHandle, StripNode, StripSettings};
use crate::color::{BLACK, Rgb};
use crate::controller::LedController;
use crate::dither::DitherMode;
use crate::error::{Error, FrameStatus, Result};
use crate::limiter::{FpsCounter, FrameRateLimiter, MIN_DITHER_FPS};
use crate::power::{PowerGovernor, PowerLimit, PowerModel, max_brightness_for_budget};

/// Initial settings of a [`PixelOutput`].
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Global brightness (0-255)
    pub brightness: u8,
    /// Refresh ceiling in Hz, 0 to let attached strips decide
    pub max_refresh_rate: u16,
    pub power_model: PowerModel,
    pub power_limit: Option<PowerLimit>,
    /// Settings given to every newly attached strip
    pub strip: StripSettings,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            brightness: 255,
            max_refresh_rate: 0,
            power_model: PowerModel::default(),
            power_limit: None,
            strip: StripSettings::default(),
        }
    }
}

/// Summary of one show across all strips.
///
/// A failing strip never stops the others: its error is counted here and
/// the remaining strips still receive their frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShowReport {
    /// Brightness actually used after power limiting.
    pub brightness: u8,
    /// Strips that received a partially stale frame.
    pub glitched: u8,
    /// Strips whose frame was abandoned.
    pub dropped: u8,
    /// Strips that could not be serviced at all.
    pub failed: u8,
    /// First error met during the show.
    pub error: Option<Error>,
}

impl ShowReport {
    const fn new(brightness: u8) -> Self {
        Self {
            brightness,
            glitched: 0,
            dropped: 0,
            failed: 0,
            error: None,
        }
    }

    fn fail(&mut self, index: usize, error: Error) {
        warn!("strip {} not shown: {}", index, error);
        self.failed = self.failed.saturating_add(1);
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn record(&mut self, status: FrameStatus) {
        match status {
            FrameStatus::Shown => {}
            FrameStatus::Glitched => self.glitched = self.glitched.saturating_add(1),
            FrameStatus::Dropped => self.dropped = self.dropped.saturating_add(1),
        }
    }

    /// Every strip received its whole frame.
    pub const fn is_clean(&self) -> bool {
        self.glitched == 0 && self.dropped == 0 && self.failed == 0
    }
}

/// Top-level LED output.
///
/// Owns the driver chain together with the global brightness, the power
/// governor and the frame-rate limiter. The application writes into its
/// buffers and calls [`PixelOutput::show`]; everything downstream happens
/// here.
///
/// # Usage
///
/// ```ignore
/// let leds = RefCell::new([Rgb::default(); 60]);
/// let mut strip = ClocklessController::new(pin, port, ClocklessConfig::default())?;
/// let mut output: PixelOutput<'_> = PixelOutput::new(OutputConfig::default());
/// output.attach(&mut strip, &leds)?;
///
/// loop {
///     leds.borrow_mut()[0] = Rgb::new(255, 0, 0);
///     output.show();
/// }
/// ```
pub struct PixelOutput<'a, const N: usize = DEFAULT_CAPACITY> {
    chain: DriverChain<'a, N>,
    brightness: u8,
    strip_settings: StripSettings,
    limiter: FrameRateLimiter,
    refresh_overridden: bool,
    power: PowerGovernor,
    fps: FpsCounter,
}

impl<'a, const N: usize> PixelOutput<'a, N> {
    pub fn new(config: OutputConfig) -> Self {
        let mut power = PowerGovernor::new(config.power_model);
        power.set_limit(config.power_limit);
        Self {
            chain: DriverChain::new(),
            brightness: config.brightness,
            strip_settings: config.strip,
            limiter: FrameRateLimiter::with_max_refresh_rate(config.max_refresh_rate),
            refresh_overridden: false,
            power,
            fps: FpsCounter::default(),
        }
    }

    /// Attach a strip covering the whole buffer.
    ///
    /// The strip's refresh ceiling tightens the limiter unless the rate was
    /// set explicitly.
    pub fn attach(
        &mut self,
        controller: &'a mut dyn LedController,
        buffer: &'a RefCell<[Rgb]>,
    ) -> Result<StripHandle> {
        let handle = self.chain.attach(controller, buffer, self.strip_settings)?;
        self.constrain_refresh(handle);
        Ok(handle)
    }

    /// Attach a strip covering part of a buffer.
    pub fn attach_range(
        &mut self,
        controller: &'a mut dyn LedController,
        buffer: &'a RefCell<[Rgb]>,
        offset: usize,
        len: usize,
    ) -> Result<StripHandle> {
        let handle =
            self.chain
                .attach_range(controller, buffer, offset, len, self.strip_settings)?;
        self.constrain_refresh(handle);
        Ok(handle)
    }

    fn constrain_refresh(&mut self, handle: StripHandle) {
        if self.refresh_overridden {
            return;
        }
        if let Some(node) = self.chain.node(handle) {
            self.limiter.set_max_refresh_rate(node.max_refresh_rate(), true);
        }
    }

    pub fn detach(&mut self, handle: StripHandle) -> Result<()> {
        self.chain.detach(handle)
    }

    /// Show every buffer at the global brightness.
    pub fn show(&mut self) -> ShowReport {
        self.show_with(self.brightness)
    }

    /// Show every buffer at the given brightness.
    ///
    /// Waits for the frame-rate limiter, lowers the brightness to fit the
    /// power budget, then pushes each strip in attachment order. A strip
    /// whose buffer is busy is skipped and counted in the report.
    pub fn show_with(&mut self, brightness: u8) -> ShowReport {
        self.limiter.wait();
        self.limiter.mark();

        let brightness = if self.power.limit().is_some() {
            let power_mw = self.readable_power_mw();
            self.power.limit_brightness(power_mw, brightness)
        } else {
            brightness
        };

        let suppress_dither = self.fps.fps() < MIN_DITHER_FPS;
        let mut report = ShowReport::new(brightness);
        for (index, node) in self.chain.iter_mut().enumerate() {
            let dither = if suppress_dither {
                DitherMode::Disabled
            } else {
                node.dither()
            };
            match node.show_leds_with(brightness, dither) {
                Ok(status) => report.record(status),
                Err(error) => report.fail(index, error),
            }
        }

        self.fps.count(Instant::now());
        report
    }

    /// Fill every strip with one color without touching the buffers.
    pub fn show_color(&mut self, color: Rgb, brightness: u8) -> ShowReport {
        self.limiter.wait();
        self.limiter.mark();

        let suppress_dither = self.fps.fps() < MIN_DITHER_FPS;
        let mut report = ShowReport::new(brightness);
        for (index, node) in self.chain.iter_mut().enumerate() {
            let dither = if suppress_dither {
                DitherMode::Disabled
            } else {
                node.dither()
            };
            match node.show_color_with(color, brightness, dither) {
                Ok(status) => report.record(status),
                Err(error) => report.fail(index, error),
            }
        }

        self.fps.count(Instant::now());
        report
    }

    /// Clear every buffer, and blank the strips too when `write` is set.
    pub fn clear(&mut self, write: bool) -> Result<()> {
        if write {
            let report = self.show_color(BLACK, 0);
            if let Some(error) = report.error {
                return Err(error);
            }
        }
        self.clear_data()
    }

    /// Set every attached buffer to black without showing.
    pub fn clear_data(&self) -> Result<()> {
        for node in self.chain.iter() {
            node.clear_leds()?;
        }
        Ok(())
    }

    /// Keep refreshing for `duration` so dithering can work on a still image.
    ///
    /// Shows at least once and returns the report of the last frame.
    pub fn show_for(&mut self, duration: Duration) -> ShowReport {
        let start = Instant::now();
        loop {
            let report = self.show();
            if start.elapsed() >= duration {
                return report;
            }
        }
    }

    pub const fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness;
    }

    /// Cap the estimated draw at `volts * milliamps`.
    pub fn set_max_power_volts_milliamps(&mut self, volts: u8, milliamps: u32) {
        self.power
            .set_limit(Some(PowerLimit::from_volts_milliamps(volts, milliamps)));
    }

    pub fn set_max_power_milliwatts(&mut self, milliwatts: u32) {
        self.power
            .set_limit(Some(PowerLimit::from_milliwatts(milliwatts)));
    }

    pub fn clear_max_power(&mut self) {
        self.power.set_limit(None);
    }

    pub const fn power(&self) -> &PowerGovernor {
        &self.power
    }

    /// Estimated full-brightness draw of all strips plus the controller.
    pub fn estimate_power_mw(&self) -> Result<u32> {
        let buffers: Vec<Ref<'a, [Rgb]>, N> =
            self.chain.iter().map(StripNode::leds).collect::<Result<_>>()?;
        Ok(self.power.estimate_chain_mw(buffers.iter().map(|leds| &**leds)))
    }

    // Strips with a busy buffer are left out; they are skipped by the show too.
    fn readable_power_mw(&self) -> u32 {
        let buffers: Vec<Ref<'a, [Rgb]>, N> =
            self.chain.iter().filter_map(|node| node.leds().ok()).collect();
        self.power.estimate_chain_mw(buffers.iter().map(|leds| &**leds))
    }

    /// Brightness the power budget allows for the current buffers.
    pub fn max_brightness_for_power(&self, target: u8) -> Result<u8> {
        let Some(limit) = self.power.limit() else {
            return Ok(target);
        };
        let power_mw = self.estimate_power_mw()?;
        Ok(max_brightness_for_budget(power_mw, target, limit.max_mw))
    }

    /// Set the dither mode of every strip, including strips attached later.
    pub fn set_dither(&mut self, mode: DitherMode) {
        self.strip_settings.dither = mode;
        self.chain.for_each_mut(|node| node.set_dither(mode));
    }

    /// Set the color correction of every strip, including strips attached later.
    pub fn set_correction(&mut self, correction: impl Into<Rgb>) {
        let correction = correction.into();
        self.strip_settings.correction = correction;
        self.chain.for_each_mut(|node| node.set_correction(correction));
    }

    /// Set the color temperature of every strip, including strips attached later.
    pub fn set_temperature(&mut self, temperature: impl Into<Rgb>) {
        let temperature = temperature.into();
        self.strip_settings.temperature = temperature;
        self.chain.for_each_mut(|node| node.set_temperature(temperature));
    }

    /// Set the refresh ceiling.
    ///
    /// With `constrain` the limit can only tighten. Without it the value is
    /// taken as is and strips attached later no longer change it.
    pub fn set_max_refresh_rate(&mut self, hz: u16, constrain: bool) {
        if !constrain {
            self.refresh_overridden = true;
        }
        self.limiter.set_max_refresh_rate(hz, constrain);
    }

    pub const fn limiter(&self) -> &FrameRateLimiter {
        &self.limiter
    }

    /// Measured frames per second.
    pub const fn fps(&self) -> u16 {
        self.fps.fps()
    }

    /// Number of attached strips.
    pub fn count(&self) -> usize {
        self.chain.count()
    }

    /// Pixels on the first strip, 0 when nothing is attached.
    pub fn size(&self) -> usize {
        self.chain.get(0).map_or(0, StripNode::len)
    }

    /// Strip at `index`, the first strip when out of range.
    pub fn at(&self, index: usize) -> Option<&StripNode<'a>> {
        self.chain.at(index)
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut StripNode<'a>> {
        self.chain.at_mut(index)
    }

    pub fn get(&self, index: usize) -> Option<&StripNode<'a>> {
        self.chain.get(index)
    }

    pub fn node_mut(&mut self, handle: StripHandle) -> Option<&mut StripNode<'a>> {
        self.chain.node_mut(handle)
    }

    pub const fn chain(&self) -> &DriverChain<'a, N> {
        &self.chain
    }
}

impl<const N: usize> Default for PixelOutput<'_, N> {
    fn default() -> Self {
        Self::new(OutputConfig::default())
    }
}
