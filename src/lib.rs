#![no_std]

pub mod adapter;
pub mod adjustment;
pub mod chain;
pub mod clocked;
pub mod clockless;
pub mod color;
pub mod controller;
pub mod dither;
pub mod error;
pub mod gamma;
pub mod limiter;
pub mod math8;
pub mod output;
pub mod power;
pub mod stream;
pub mod timing;

pub use adapter::SmartLedsController;
pub use adjustment::{ColorCorrection, ColorTemperature, compute_adjustment};
pub use chain::{DriverChain, StripHandle, StripNode, StripSettings};
pub use clocked::{
    BitBangSpi, ClockedBus, ClockedChipset, ClockedConfig, ClockedController, HardwareSpi,
};
pub use clockless::{
    ClocklessConfig, ClocklessController, InterruptMode, OverrunPolicy, TimingSpec, WaveState,
};
pub use controller::LedController;
pub use dither::DitherMode;
pub use error::{Error, FrameStatus, Result};
pub use limiter::{FpsCounter, FrameRateLimiter};
pub use output::{OutputConfig, PixelOutput, ShowReport};
pub use power::{PowerLimit, PowerModel};
pub use stream::{ChannelOrder, PixelStream};
pub use timing::{CounterPort, TimingPort};

pub use color::{Hsv, Rgb};
pub use embassy_time::{Duration, Instant};
