//! Cycle-accurate timing port.
//!
//! Waveform encoders need a free-running counter with sub-microsecond
//! resolution and a way to spin until a deadline. Platforms supply both
//! through [`TimingPort`]; nothing else in the crate reads a clock while a
//! bit is on the wire.

/// Source of cycle-accurate time for waveform generation.
///
/// `now` is a wrapping 32-bit counter. Deadlines are compared with
/// wrapping arithmetic, so they must lie less than `2^31` cycles ahead.
pub trait TimingPort {
    /// Counter ticks per microsecond.
    fn cycles_per_us(&self) -> u32;

    /// Current counter value.
    fn now(&self) -> u32;

    /// Spin until the counter reaches `deadline`.
    fn busy_wait_until(&mut self, deadline: u32) {
        while !deadline_reached(self.now(), deadline) {
            core::hint::spin_loop();
        }
    }

    /// Spin for the given number of cycles.
    fn busy_wait_cycles(&mut self, cycles: u32) {
        let deadline = self.now().wrapping_add(cycles);
        self.busy_wait_until(deadline);
    }

    /// Spin for the given number of microseconds.
    fn busy_wait_us(&mut self, us: u32) {
        let cycles = us.saturating_mul(self.cycles_per_us());
        self.busy_wait_cycles(cycles);
    }
}

/// Whether `now` is at or past `deadline` on a wrapping counter.
#[inline]
#[allow(clippy::cast_possible_wrap)]
pub const fn deadline_reached(now: u32, deadline: u32) -> bool {
    (now.wrapping_sub(deadline) as i32) >= 0
}

/// Cycles elapsed from `since` to `now` on a wrapping counter.
#[inline]
pub const fn elapsed_cycles(since: u32, now: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Convert nanoseconds to counter cycles, rounding up.
///
/// Evaluated once when a strip is configured, never per bit.
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub const fn ns_to_cycles(ns: u32, cycles_per_us: u32) -> u32 {
    ((ns as u64 * cycles_per_us as u64 + 999) / 1000) as u32
}

/// [`TimingPort`] backed by a counter-reading closure.
///
/// Wraps a hardware cycle counter, e.g. a core cycle counter register:
///
/// ```ignore
/// let port = CounterPort::new(240, || read_cycle_counter());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CounterPort<F> {
    cycles_per_us: u32,
    read: F,
}

impl<F: Fn() -> u32> CounterPort<F> {
    /// Create a port for a counter running at `cycles_per_us` MHz.
    pub const fn new(cycles_per_us: u32, read: F) -> Self {
        Self {
            cycles_per_us,
            read,
        }
    }
}

impl<F: Fn() -> u32> TimingPort for CounterPort<F> {
    fn cycles_per_us(&self) -> u32 {
        self.cycles_per_us
    }

    fn now(&self) -> u32 {
        (self.read)()
    }
}
