mod utils;

use smart_leds::{RGB8, hsv::Hsv as HSV};
pub use utils::{add_colors, blend_colors, hsv2rgb, rgb_from_u32, scale_color};

pub type Rgb = RGB8;
pub type Hsv = HSV;

/// All channels off
pub const BLACK: Rgb = rgb_from_u32(0x00_0000);

/// All channels at full scale
pub const WHITE: Rgb = rgb_from_u32(0xFF_FFFF);
