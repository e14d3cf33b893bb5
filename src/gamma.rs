//! Gamma curves for perceptual brightness.

use crate::color::Rgb;

/// Gamma commonly used for WS2812-class pixels.
pub const DEFAULT_GAMMA: f32 = 2.8;

/// Apply a gamma curve to a single channel value.
///
/// A non-zero input never maps to zero, so dim pixels stay lit.
#[inline]
#[allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn apply_gamma_video(value: u8, gamma: f32) -> u8 {
    let normalized = f32::from(value) / 255.0;
    let adjusted = (libm::powf(normalized, gamma) * 255.0).clamp(0.0, 255.0) as u8;
    if value > 0 && adjusted == 0 { 1 } else { adjusted }
}

/// Apply a gamma curve to every channel of a color.
pub fn apply_gamma_video_rgb(color: Rgb, gamma: f32) -> Rgb {
    Rgb {
        r: apply_gamma_video(color.r, gamma),
        g: apply_gamma_video(color.g, gamma),
        b: apply_gamma_video(color.b, gamma),
    }
}

/// Precomputed gamma lookup table.
///
/// Building the table costs 256 `powf` calls once; lookups are free after
/// that, which makes it suitable for per-frame use.
#[derive(Debug, Clone)]
pub struct GammaTable {
    lut: [u8; 256],
}

impl GammaTable {
    /// Build a table for the given gamma exponent.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(gamma: f32) -> Self {
        let mut lut = [0u8; 256];
        for (index, slot) in lut.iter_mut().enumerate() {
            *slot = apply_gamma_video(index as u8, gamma);
        }
        Self { lut }
    }

    /// Look up a single channel.
    #[inline]
    pub const fn apply(&self, value: u8) -> u8 {
        self.lut[value as usize]
    }

    /// Apply the table to a buffer in place.
    pub fn apply_slice(&self, pixels: &mut [Rgb]) {
        for pixel in pixels {
            pixel.r = self.apply(pixel.r);
            pixel.g = self.apply(pixel.g);
            pixel.b = self.apply(pixel.b);
        }
    }
}

impl Default for GammaTable {
    fn default() -> Self {
        Self::new(DEFAULT_GAMMA)
    }
}
