//! Power budget governor.
//!
//! Estimates what a frame would draw at full brightness and picks the
//! highest brightness that keeps the whole installation under a wattage
//! ceiling. The estimate is linear in each channel value, which matches
//! constant-current LED drivers well enough for budgeting.

use log::trace;

use crate::color::Rgb;

/// Draw per pixel of each channel at full scale, plus fixed overheads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerModel {
    pub red_mw: u32,
    pub green_mw: u32,
    pub blue_mw: u32,
    /// Quiescent draw of an unlit pixel.
    pub dark_mw: u32,
    /// Draw of the controller itself, counted once per installation.
    pub mcu_mw: u32,
}

impl PowerModel {
    /// Typical 5 V WS2812-class pixel: 16/11/15 mA per channel, 1 mA dark,
    /// 25 mA for the microcontroller.
    pub const WS2812_5V: Self = Self {
        red_mw: 16 * 5,
        green_mw: 11 * 5,
        blue_mw: 15 * 5,
        dark_mw: 5,
        mcu_mw: 25 * 5,
    };

    /// Unscaled draw of one buffer in milliwatts, without controller overhead.
    pub fn estimate_mw(&self, pixels: &[Rgb]) -> u32 {
        let (mut red, mut green, mut blue) = (0u64, 0u64, 0u64);
        for pixel in pixels {
            red += u64::from(pixel.r);
            green += u64::from(pixel.g);
            blue += u64::from(pixel.b);
        }
        let lit = (red * u64::from(self.red_mw)) >> 8;
        let lit = lit + ((green * u64::from(self.green_mw)) >> 8);
        let lit = lit + ((blue * u64::from(self.blue_mw)) >> 8);
        let dark = pixels.len() as u64 * u64::from(self.dark_mw);
        u32::try_from(lit + dark).unwrap_or(u32::MAX)
    }
}

impl Default for PowerModel {
    fn default() -> Self {
        Self::WS2812_5V
    }
}

/// Estimate the unscaled draw of a single buffer in milliwatts.
///
/// Uses [`PowerModel::WS2812_5V`] and leaves out the controller overhead,
/// which belongs to the installation rather than to any one buffer. Use
/// [`PowerGovernor::estimate_chain_mw`] for a total that counts it once.
pub fn estimate_power_mw(pixels: &[Rgb]) -> u32 {
    PowerModel::default().estimate_mw(pixels)
}

/// Highest brightness not exceeding `target` that fits into `budget_mw`.
///
/// `power_mw` is the draw at full brightness. The result is proportional
/// to the budget, never above `target`, and never zero while both the
/// target and the budget are non-zero.
#[allow(clippy::cast_possible_truncation)]
pub fn max_brightness_for_budget(power_mw: u32, target: u8, budget_mw: u32) -> u8 {
    let requested_mw = u64::from(power_mw) * u64::from(target) / 256;
    if requested_mw <= u64::from(budget_mw) {
        return target;
    }
    let recommended = u64::from(target) * u64::from(budget_mw) / requested_mw;
    let recommended = recommended.min(u64::from(target)) as u8;
    if budget_mw > 0 && target > 0 {
        recommended.max(1)
    } else {
        recommended
    }
}

/// Wattage ceiling for the whole installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerLimit {
    pub max_mw: u32,
}

impl PowerLimit {
    pub const fn from_milliwatts(max_mw: u32) -> Self {
        Self { max_mw }
    }

    /// Limit from supply voltage and current rating.
    pub const fn from_volts_milliamps(volts: u8, milliamps: u32) -> Self {
        Self {
            max_mw: (volts as u32).saturating_mul(milliamps),
        }
    }
}

/// Caps brightness so the estimated draw stays under a [`PowerLimit`].
#[derive(Debug, Clone, Default)]
pub struct PowerGovernor {
    model: PowerModel,
    limit: Option<PowerLimit>,
    limiting: bool,
}

impl PowerGovernor {
    pub const fn new(model: PowerModel) -> Self {
        Self {
            model,
            limit: None,
            limiting: false,
        }
    }

    pub const fn model(&self) -> &PowerModel {
        &self.model
    }

    pub const fn limit(&self) -> Option<PowerLimit> {
        self.limit
    }

    pub fn set_limit(&mut self, limit: Option<PowerLimit>) {
        self.limit = limit;
        if limit.is_none() {
            self.limiting = false;
        }
    }

    /// Whether the last call to [`Self::limit_brightness`] reduced brightness.
    pub const fn is_limiting(&self) -> bool {
        self.limiting
    }

    /// Full-brightness draw of several buffers plus the controller overhead.
    pub fn estimate_chain_mw<'b>(&self, buffers: impl IntoIterator<Item = &'b [Rgb]>) -> u32 {
        buffers
            .into_iter()
            .fold(self.model.mcu_mw, |total, pixels| {
                total.saturating_add(self.model.estimate_mw(pixels))
            })
    }

    /// Brightness to use for a frame whose full-brightness draw is `power_mw`.
    pub fn limit_brightness(&mut self, power_mw: u32, target: u8) -> u8 {
        let Some(limit) = self.limit else {
            self.limiting = false;
            return target;
        };
        let brightness = max_brightness_for_budget(power_mw, target, limit.max_mw);
        self.limiting = brightness < target;
        if self.limiting {
            trace!(
                "power limit {} mW: brightness {} -> {} ({} mW requested)",
                limit.max_mw, target, brightness, power_mw
            );
        }
        brightness
    }
}
