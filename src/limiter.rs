//! Frame pacing.
//!
//! Clockless strips need an idle gap between frames and most strips cannot
//! usefully refresh faster than a few hundred Hz. The limiter enforces a
//! minimum interval between shows by busy-waiting, the FPS counter measures
//! the rate actually achieved.

use embassy_time::{Duration, Instant};
use log::{debug, trace};

/// Frames between FPS recalculations.
pub const DEFAULT_FPS_WINDOW: u16 = 25;

/// Below this rate dithering is suppressed, its noise becomes visible.
pub const MIN_DITHER_FPS: u16 = 100;

/// Minimum-interval gate between consecutive shows.
#[derive(Debug, Clone)]
pub struct FrameRateLimiter {
    min_interval: Duration,
    last_show: Option<Instant>,
}

impl FrameRateLimiter {
    /// Limiter without a refresh ceiling.
    pub const fn new() -> Self {
        Self {
            min_interval: Duration::from_ticks(0),
            last_show: None,
        }
    }

    /// Limiter with a refresh ceiling in Hz.
    pub fn with_max_refresh_rate(hz: u16) -> Self {
        let mut limiter = Self::new();
        limiter.set_max_refresh_rate(hz, false);
        limiter
    }

    /// Minimum time between two shows.
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Set the refresh ceiling.
    ///
    /// With `constrain` the interval can only grow, so attaching a faster
    /// strip never loosens a slower strip's limit; a zero rate is ignored.
    /// Without it the interval is replaced, and zero removes the limit.
    pub fn set_max_refresh_rate(&mut self, hz: u16, constrain: bool) {
        let interval = if hz == 0 {
            Duration::from_ticks(0)
        } else {
            Duration::from_micros(1_000_000 / u64::from(hz))
        };

        if constrain {
            if hz > 0 && interval > self.min_interval {
                debug!("refresh interval constrained to {} us", interval.as_micros());
                self.min_interval = interval;
            }
        } else {
            self.min_interval = interval;
        }
    }

    /// Earliest moment the next show may start.
    pub fn next_allowed(&self) -> Option<Instant> {
        self.last_show.map(|last| last + self.min_interval)
    }

    /// Busy-wait until the minimum interval since the last show has passed.
    pub fn wait(&self) {
        if let Some(deadline) = self.next_allowed() {
            while Instant::now() < deadline {
                core::hint::spin_loop();
            }
        }
    }

    /// Record that a show started now.
    pub fn mark(&mut self) {
        self.last_show = Some(Instant::now());
    }
}

impl Default for FrameRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame rate measured over a window of frames.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window: u16,
    frames: u16,
    window_start: Option<Instant>,
    fps: u16,
}

impl FpsCounter {
    pub const fn new(window: u16) -> Self {
        Self {
            window: if window == 0 { 1 } else { window },
            frames: 0,
            window_start: None,
            fps: 0,
        }
    }

    /// Last measured rate, 0 until the first window completes.
    pub const fn fps(&self) -> u16 {
        self.fps
    }

    /// Count a frame shown at `now`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn count(&mut self, now: Instant) {
        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            return;
        };
        self.frames += 1;
        if self.frames < self.window {
            return;
        }

        let elapsed_ms = now.saturating_duration_since(start).as_millis().max(1);
        self.fps = (u64::from(self.frames) * 1000 / elapsed_ms).min(u64::from(u16::MAX)) as u16;
        trace!("{} frames in {} ms: {} fps", self.frames, elapsed_ms, self.fps);
        self.frames = 0;
        self.window_start = Some(now);
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(DEFAULT_FPS_WINDOW)
    }
}
