//! Per-strip color adjustment.
//!
//! Every strip carries a color correction (compensates the LED's native
//! white point) and a color temperature (tints the output). Both are folded
//! together with the global brightness into a single per-channel scale right
//! before a frame is pushed.

use crate::color::{Rgb, rgb_from_u32};

/// White-balance corrections for common LED packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorCorrection {
    /// SMD5050 strips (255, 176, 240)
    TypicalSmd5050,
    /// Typical flexible strips (255, 176, 240)
    TypicalLedStrip,
    /// Through-hole 8mm pixels (255, 224, 140)
    Typical8mmPixel,
    /// Pixel strings (255, 224, 140)
    TypicalPixelString,
    /// No correction
    Uncorrected,
}

impl ColorCorrection {
    /// Correction factors for each channel.
    pub const fn rgb(self) -> Rgb {
        match self {
            Self::TypicalSmd5050 | Self::TypicalLedStrip => rgb_from_u32(0xFF_B0F0),
            Self::Typical8mmPixel | Self::TypicalPixelString => rgb_from_u32(0xFF_E08C),
            Self::Uncorrected => rgb_from_u32(0xFF_FFFF),
        }
    }
}

impl From<ColorCorrection> for Rgb {
    fn from(value: ColorCorrection) -> Self {
        value.rgb()
    }
}

/// Light-source tints.
///
/// Blackbody presets are listed with their approximate temperature, the
/// gaseous light sources have no meaningful Kelvin value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorTemperature {
    /// 1900 K
    Candle,
    /// 2600 K
    Tungsten40W,
    /// 2850 K
    Tungsten100W,
    /// 3200 K
    Halogen,
    /// 5200 K
    CarbonArc,
    /// 5400 K
    HighNoonSun,
    /// 6000 K
    DirectSunlight,
    /// 7000 K
    OvercastSky,
    /// 20000 K
    ClearBlueSky,
    WarmFluorescent,
    StandardFluorescent,
    CoolWhiteFluorescent,
    FullSpectrumFluorescent,
    GrowLightFluorescent,
    BlackLightFluorescent,
    MercuryVapor,
    SodiumVapor,
    MetalHalide,
    HighPressureSodium,
    /// No tint
    Uncorrected,
}

impl ColorTemperature {
    /// Tint factors for each channel.
    pub const fn rgb(self) -> Rgb {
        rgb_from_u32(match self {
            Self::Candle => 0xFF_9329,
            Self::Tungsten40W => 0xFF_C58F,
            Self::Tungsten100W => 0xFF_D6AA,
            Self::Halogen => 0xFF_F1E0,
            Self::CarbonArc => 0xFF_FAF4,
            Self::HighNoonSun => 0xFF_FFFB,
            Self::DirectSunlight | Self::Uncorrected => 0xFF_FFFF,
            Self::OvercastSky => 0xC9_E2FF,
            Self::ClearBlueSky => 0x40_9CFF,
            Self::WarmFluorescent => 0xFF_F4E5,
            Self::StandardFluorescent => 0xF4_FFFA,
            Self::CoolWhiteFluorescent => 0xD4_EBFF,
            Self::FullSpectrumFluorescent => 0xFF_F4F2,
            Self::GrowLightFluorescent => 0xFF_EFF7,
            Self::BlackLightFluorescent => 0xA7_00FF,
            Self::MercuryVapor => 0xD8_F7FF,
            Self::SodiumVapor => 0xFF_D1B2,
            Self::MetalHalide => 0xF2_FCFF,
            Self::HighPressureSodium => 0xFF_B74C,
        })
    }
}

impl From<ColorTemperature> for Rgb {
    fn from(value: ColorTemperature) -> Self {
        value.rgb()
    }
}

/// Fold brightness, correction and temperature into per-channel scales.
///
/// Each channel is `(correction + 1) * (temperature + 1) * brightness / 65536`.
/// A channel whose correction or temperature is zero is switched off, and
/// zero brightness yields black.
#[allow(clippy::cast_possible_truncation)]
pub const fn compute_adjustment(brightness: u8, correction: Rgb, temperature: Rgb) -> Rgb {
    if brightness == 0 {
        return Rgb { r: 0, g: 0, b: 0 };
    }
    Rgb {
        r: adjust_channel(brightness, correction.r, temperature.r),
        g: adjust_channel(brightness, correction.g, temperature.g),
        b: adjust_channel(brightness, correction.b, temperature.b),
    }
}

#[inline]
#[allow(clippy::cast_lossless, clippy::cast_possible_truncation)]
const fn adjust_channel(brightness: u8, correction: u8, temperature: u8) -> u8 {
    if correction == 0 || temperature == 0 {
        return 0;
    }
    let work = (correction as u32 + 1) * (temperature as u32 + 1) * brightness as u32;
    (work >> 16) as u8
}

/// Approximate the tint of a blackbody radiator.
///
/// Valid for 1000 K to 40000 K; values outside are clamped. The result is
/// meant to be used as a color temperature, not as a display color.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn temperature_from_kelvin(kelvin: u16) -> Rgb {
    let hecto = (f32::from(kelvin) / 100.0).clamp(10.0, 400.0);

    let r = if hecto <= 66.0 {
        255.0
    } else {
        329.698_73 * libm::powf(hecto - 60.0, -0.133_204_76)
    };
    let g = if hecto <= 66.0 {
        99.470_8 * libm::logf(hecto) - 161.119_57
    } else {
        288.122_17 * libm::powf(hecto - 60.0, -0.075_514_85)
    };
    let b = if hecto >= 66.0 {
        255.0
    } else if hecto <= 19.0 {
        0.0
    } else {
        138.517_73 * libm::logf(hecto - 10.0) - 305.044_8
    };

    Rgb {
        r: r.clamp(0.0, 255.0) as u8,
        g: g.clamp(0.0, 255.0) as u8,
        b: b.clamp(0.0, 255.0) as u8,
    }
}
