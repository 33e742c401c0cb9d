//! Wall-clock playback simulator.
//!
//! Stands in for an audio player when none is attached: it advances with
//! real time (scaled by a playback rate), can be paused, resumed and seeked,
//! and stops at the end of the passage.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::feed::PositionSource;

const MIN_RATE: f64 = 0.25;
const MAX_RATE: f64 = 4.0;

struct Clock {
    /// Position at `anchor`.
    base_ms: f64,
    anchor: Instant,
    playing: bool,
    rate: f64,
}

impl Clock {
    fn position_at(&self, now: Instant, duration_ms: u64) -> u64 {
        let elapsed = if self.playing {
            now.saturating_duration_since(self.anchor).as_secs_f64() * 1_000.0 * self.rate
        } else {
            0.0
        };
        ((self.base_ms + elapsed).round() as u64).min(duration_ms)
    }

    /// Fold elapsed time into `base_ms` so rate or state can change.
    fn rebase(&mut self, now: Instant, duration_ms: u64) {
        self.base_ms = self.position_at(now, duration_ms) as f64;
        self.anchor = now;
    }
}

/// Simulated player for a passage of `duration_ms`.  Starts playing at 0.
pub struct SimulatedPlayer {
    duration_ms: u64,
    clock: Mutex<Clock>,
}

impl SimulatedPlayer {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            clock: Mutex::new(Clock {
                base_ms: 0.0,
                anchor: Instant::now(),
                playing: true,
                rate: 1.0,
            }),
        }
    }

    /// Builder-style playback rate; clamped to `0.25..=4.0`.
    pub fn with_rate(self, rate: f64) -> Self {
        self.set_rate(rate);
        self
    }

    fn clock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn position(&self) -> u64 {
        self.clock().position_at(Instant::now(), self.duration_ms)
    }

    pub fn rate(&self) -> f64 {
        self.clock().rate
    }

    /// Change the playback rate without moving the current position.
    /// Non-finite rates are ignored.
    pub fn set_rate(&self, rate: f64) {
        if !rate.is_finite() {
            log::warn!("player: ignoring playback rate {rate}");
            return;
        }
        let mut clock = self.clock();
        clock.rebase(Instant::now(), self.duration_ms);
        clock.rate = rate.clamp(MIN_RATE, MAX_RATE);
    }

    pub fn pause(&self) {
        let mut clock = self.clock();
        if clock.playing {
            clock.rebase(Instant::now(), self.duration_ms);
            clock.playing = false;
        }
    }

    pub fn resume(&self) {
        let mut clock = self.clock();
        if !clock.playing {
            clock.anchor = Instant::now();
            clock.playing = true;
        }
    }

    /// Jump to `position_ms` (clamped to the duration).
    pub fn seek(&self, position_ms: u64) {
        let mut clock = self.clock();
        clock.base_ms = position_ms.min(self.duration_ms) as f64;
        clock.anchor = Instant::now();
    }

    /// `true` once the position has reached the end of the passage.
    pub fn is_finished(&self) -> bool {
        self.position() >= self.duration_ms
    }
}

impl PositionSource for SimulatedPlayer {
    fn position_ms(&self) -> Option<u64> {
        Some(self.position())
    }

    fn is_playing(&self) -> bool {
        self.clock().playing
    }
}

impl std::fmt::Debug for SimulatedPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let clock = self.clock();
        f.debug_struct("SimulatedPlayer")
            .field("duration_ms", &self.duration_ms)
            .field("position_ms", &clock.position_at(Instant::now(), self.duration_ms))
            .field("playing", &clock.playing)
            .field("rate", &clock.rate)
            .finish()
    }
}
