use displaydoc::Display;

/// A specialized result type for the LED output pipeline.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur while configuring or driving LED strips.
#[derive(Clone, Copy, PartialEq, Eq, Display, Debug)]
pub enum Error {
    /// The driver chain has no room for another strip.
    CapacityExceeded,
    /// A strip must cover at least one pixel.
    EmptyStrip,
    /// The requested pixel range does not fit into the buffer.
    RangeOutOfBounds,
    /// The strip handle does not refer to an attached strip.
    UnknownStrip,
    /// The pixel buffer is mutably borrowed by the application.
    BufferBusy,
    /// Unable to drive the output pin.
    Pin,
    /// The serial bus reported a write error.
    Bus,
    /// The bus cannot clock out individual bits.
    BitWriteUnsupported,
    /// The timing parameters produce a zero-length bit cycle.
    InvalidTiming,
}

/// Outcome of pushing one frame to a single strip.
///
/// Timing overruns are not errors: the frame is either repaired by a retry
/// or reported here and the application keeps going.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum FrameStatus {
    /// The whole frame reached the strip intact.
    #[default]
    Shown,
    /// An overrun was tolerated; some pixels may show stale data.
    Glitched,
    /// Every attempt overran and the frame was abandoned.
    Dropped,
}
