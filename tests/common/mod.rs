#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, OutputPin};
use myrtio_led_driver::timing::deadline_reached;
use myrtio_led_driver::{
    ChannelOrder, ClockedBus, FrameStatus, LedController, PixelStream, Result, TimingPort,
};

/// Simulated cycle counter. Time only moves when someone waits.
#[derive(Clone)]
pub struct SimClock {
    now: Rc<Cell<u32>>,
    cycles_per_us: u32,
}

impl SimClock {
    pub fn new(cycles_per_us: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
            cycles_per_us,
        }
    }

    pub fn advance(&self, cycles: u32) {
        self.now.set(self.now.get().wrapping_add(cycles));
    }
}

impl TimingPort for SimClock {
    fn cycles_per_us(&self) -> u32 {
        self.cycles_per_us
    }

    fn now(&self) -> u32 {
        self.now.get()
    }

    fn busy_wait_until(&mut self, deadline: u32) {
        if !deadline_reached(self.now.get(), deadline) {
            self.now.set(deadline);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub pin: u8,
    pub at: u32,
    pub high: bool,
}

pub type EdgeLog = Rc<RefCell<Vec<Edge>>>;

/// Output pin that logs every level change against the simulated clock.
///
/// Optionally stalls the clock after every `n`-th completed high pulse, the
/// way a long interrupt would.
pub struct TracePin {
    id: u8,
    clock: SimClock,
    log: EdgeLog,
    level: bool,
    pulses: usize,
    stall: Option<Stall>,
}

#[derive(Clone, Copy)]
pub struct Stall {
    pub every: usize,
    pub cycles: u32,
    pub once: bool,
}

impl TracePin {
    pub fn new(id: u8, clock: &SimClock, log: &EdgeLog) -> Self {
        Self {
            id,
            clock: clock.clone(),
            log: log.clone(),
            level: false,
            pulses: 0,
            stall: None,
        }
    }

    pub fn with_stall(mut self, stall: Stall) -> Self {
        self.stall = Some(stall);
        self
    }

    fn record(&mut self, high: bool) {
        self.log.borrow_mut().push(Edge {
            pin: self.id,
            at: self.clock.now(),
            high,
        });
        let pulse_ended = self.level && !high;
        self.level = high;
        if pulse_ended {
            self.pulses += 1;
            if let Some(stall) = self.stall {
                if self.pulses % stall.every == 0 {
                    self.clock.advance(stall.cycles);
                    if stall.once {
                        self.stall = None;
                    }
                }
            }
        }
    }
}

impl ErrorType for TracePin {
    type Error = Infallible;
}

impl OutputPin for TracePin {
    fn set_low(&mut self) -> core::result::Result<(), Self::Error> {
        self.record(false);
        Ok(())
    }

    fn set_high(&mut self) -> core::result::Result<(), Self::Error> {
        self.record(true);
        Ok(())
    }
}

/// Widths of the high pulses seen on one pin, with their start times.
pub fn high_pulses(log: &EdgeLog, pin: u8) -> Vec<(u32, u32)> {
    let mut pulses = Vec::new();
    let mut rise = None;
    for edge in log.borrow().iter().filter(|edge| edge.pin == pin) {
        match (edge.high, rise) {
            (true, None) => rise = Some(edge.at),
            (false, Some(start)) => {
                pulses.push((start, edge.at - start));
                rise = None;
            }
            _ => {}
        }
    }
    pulses
}

/// Decode pulse widths into bytes, MSB first.
pub fn decode_bytes(widths: &[u32], one_width: u32, zero_width: u32) -> Vec<u8> {
    widths
        .chunks(8)
        .map(|bits| {
            bits.iter().fold(0u8, |byte, &width| {
                assert!(
                    width == one_width || width == zero_width,
                    "unexpected pulse width {width}"
                );
                (byte << 1) | u8::from(width == one_width)
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Byte(u8),
    Bit(bool),
    Select,
    Release,
}

/// Clocked bus that records what would have been shifted out.
#[derive(Clone, Default)]
pub struct RecordingBus {
    pub tokens: Rc<RefCell<Vec<Token>>>,
}

impl RecordingBus {
    pub fn bytes(&self) -> Vec<u8> {
        self.tokens
            .borrow()
            .iter()
            .filter_map(|token| match token {
                Token::Byte(byte) => Some(*byte),
                _ => None,
            })
            .collect()
    }
}

impl ClockedBus for RecordingBus {
    fn select(&mut self) -> Result<()> {
        self.tokens.borrow_mut().push(Token::Select);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.tokens.borrow_mut().push(Token::Release);
        Ok(())
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.tokens.borrow_mut().push(Token::Byte(byte));
        Ok(())
    }

    fn supports_bit_writes(&self) -> bool {
        true
    }

    fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.tokens.borrow_mut().push(Token::Bit(bit));
        Ok(())
    }
}

/// Controller that keeps every frame it was asked to show.
pub struct RecordingController {
    pub frames: Rc<RefCell<Vec<Vec<[u8; 3]>>>>,
    pub order: ChannelOrder,
    pub max_refresh_rate: u16,
    pub inits: usize,
}

impl RecordingController {
    pub fn new() -> Self {
        Self {
            frames: Rc::default(),
            order: ChannelOrder::Rgb,
            max_refresh_rate: 0,
            inits: 0,
        }
    }

    pub fn with_refresh(max_refresh_rate: u16) -> Self {
        Self {
            max_refresh_rate,
            ..Self::new()
        }
    }

    pub fn last_frame(&self) -> Vec<[u8; 3]> {
        self.frames.borrow().last().cloned().unwrap_or_default()
    }
}

impl LedController for RecordingController {
    fn init(&mut self) -> Result<()> {
        self.inits += 1;
        Ok(())
    }

    fn show_pixels(&mut self, pixels: PixelStream<'_>) -> Result<FrameStatus> {
        self.frames.borrow_mut().push(pixels.collect());
        Ok(FrameStatus::Shown)
    }

    fn channel_order(&self) -> ChannelOrder {
        self.order
    }

    fn max_refresh_rate(&self) -> u16 {
        self.max_refresh_rate
    }
}
