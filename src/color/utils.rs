pub use smart_leds::hsv::hsv2rgb;

use crate::{
    color::Rgb,
    math8::{blend8, qadd8, scale8},
};

/// Add two colors channel by channel, saturating at full scale
#[inline]
pub const fn add_colors(a: Rgb, b: Rgb) -> Rgb {
    Rgb {
        r: qadd8(a.r, b.r),
        g: qadd8(a.g, b.g),
        b: qadd8(a.b, b.b),
    }
}

/// Scale every channel of a color by the same factor
///
/// A scale of 255 keeps the color unchanged, 0 turns it off.
#[inline]
pub const fn scale_color(color: Rgb, scale: u8) -> Rgb {
    Rgb {
        r: scale8(color.r, scale),
        g: scale8(color.g, scale),
        b: scale8(color.b, scale),
    }
}

/// Mix `b` into `a`; 0 keeps `a`, 255 gives `b`.
#[inline]
pub const fn blend_colors(a: Rgb, b: Rgb, amount_of_b: u8) -> Rgb {
    Rgb {
        r: blend8(a.r, b.r, amount_of_b),
        g: blend8(a.g, b.g, amount_of_b),
        b: blend8(a.b, b.b, amount_of_b),
    }
}

/// Color from a `0xRRGGBB` code, the top byte is ignored.
pub const fn rgb_from_u32(code: u32) -> Rgb {
    let [_, r, g, b] = code.to_be_bytes();
    Rgb { r, g, b }
}
