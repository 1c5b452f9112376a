//! Cancellable countdown timer for Lobbyforge lobbies.
//!
//! A lobby that reaches its minimum player count arms a [`Countdown`];
//! every tick decrements the remaining seconds and the lobby goes live
//! when it hits zero. If players leave first, the lobby disarms it.
//!
//! # Integration
//!
//! The countdown sits inside a lobby actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* join, leave, ... may disarm */ }
//!         tick = countdown.wait_for_tick() => {
//!             if tick.expired { /* starting → active */ }
//!         }
//!     }
//! }
//! ```
//!
//! While disarmed, [`Countdown::wait_for_tick`] pends forever, so the
//! `select!` only services commands. State is mutated only after the
//! sleep completes, so a `wait_for_tick` future dropped by `select!`
//! leaves the countdown untouched: once a command disarms it, no tick
//! from the previous arming can fire.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Countdown settings shared by every lobby.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownConfig {
    /// Seconds from arming to game start.
    pub seconds: u32,
    /// Wall time between ticks, in milliseconds. Each tick removes one
    /// second from the countdown, so the default is 1000.
    pub tick_interval_ms: u64,
    /// Random jitter (0–max µs) added to the *first* tick so lobbies armed
    /// at the same instant don't all tick together.
    pub initial_jitter_us: u64,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            seconds: 10,
            tick_interval_ms: 1_000,
            initial_jitter_us: 2_000,
        }
    }
}

impl CountdownConfig {
    /// Longest countdown accepted.
    pub const MAX_SECONDS: u32 = 600;

    /// Shortest tick interval accepted.
    pub const MIN_TICK_INTERVAL_MS: u64 = 10;

    /// A config for `seconds` with default interval and jitter.
    pub fn with_seconds(seconds: u32) -> Self {
        Self {
            seconds,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`Countdown::new`].
    /// - `seconds` is kept within `1..=MAX_SECONDS`.
    /// - `tick_interval_ms` is at least `MIN_TICK_INTERVAL_MS`.
    pub fn validated(mut self) -> Self {
        if self.seconds == 0 || self.seconds > Self::MAX_SECONDS {
            let clamped = self.seconds.clamp(1, Self::MAX_SECONDS);
            warn!(
                seconds = self.seconds,
                clamped, "countdown seconds out of range, clamping"
            );
            self.seconds = clamped;
        }
        if self.tick_interval_ms < Self::MIN_TICK_INTERVAL_MS {
            warn!(
                interval_ms = self.tick_interval_ms,
                min = Self::MIN_TICK_INTERVAL_MS,
                "tick interval too short, clamping"
            );
            self.tick_interval_ms = Self::MIN_TICK_INTERVAL_MS;
        }
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// One step of a running countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownTick {
    /// Seconds left after this tick.
    pub remaining: u32,
    /// `true` on the tick that reached zero. The countdown is disarmed.
    pub expired: bool,
}

// ---------------------------------------------------------------------------
// Countdown
// ---------------------------------------------------------------------------

/// A per-lobby countdown. Owned by exactly one lobby actor.
pub struct Countdown {
    config: CountdownConfig,
    interval: Duration,
    /// `None` while disarmed.
    remaining: Option<u32>,
    next_tick: Option<Instant>,
    ticks_fired: u64,
}

impl Countdown {
    /// Creates a disarmed countdown.
    pub fn new(config: CountdownConfig) -> Self {
        let config = config.validated();
        let interval = config.tick_interval();
        Self {
            config,
            interval,
            remaining: None,
            next_tick: None,
            ticks_fired: 0,
        }
    }

    /// Arms the countdown at its full configured length.
    ///
    /// Re-arming an armed countdown restarts it.
    pub fn arm(&mut self) {
        self.arm_with(self.config.seconds);
    }

    /// Arms the countdown with an explicit number of seconds left
    /// (used when a lobby is restored mid-countdown).
    pub fn arm_with(&mut self, seconds: u32) {
        let seconds = seconds.clamp(1, CountdownConfig::MAX_SECONDS);
        let jitter = if self.config.initial_jitter_us > 0 {
            let us = rand::rng().random_range(0..self.config.initial_jitter_us);
            Duration::from_micros(us)
        } else {
            Duration::ZERO
        };
        self.remaining = Some(seconds);
        self.next_tick = Some(Instant::now() + self.interval + jitter);
        debug!(seconds, "countdown armed");
    }

    /// Disarms the countdown. Idempotent.
    pub fn disarm(&mut self) {
        if self.remaining.take().is_some() {
            debug!("countdown disarmed");
        }
        self.next_tick = None;
    }

    pub fn is_armed(&self) -> bool {
        self.remaining.is_some()
    }

    /// Seconds left, or `None` while disarmed.
    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    /// Total ticks fired since creation (timer and manual).
    pub fn ticks_fired(&self) -> u64 {
        self.ticks_fired
    }

    /// The configured full length.
    pub fn seconds(&self) -> u32 {
        self.config.seconds
    }

    /// Waits until the next tick is due and applies it.
    ///
    /// Pends forever while disarmed.
    pub async fn wait_for_tick(&mut self) -> CountdownTick {
        let next = match (self.remaining, self.next_tick) {
            (Some(_), Some(next)) => next,
            _ => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        time::sleep_until(next).await;

        // Late wake-ups don't queue extra ticks; schedule from now.
        self.next_tick = Some(Instant::now() + self.interval);
        self.apply_tick()
    }

    /// Applies one tick immediately, outside the timer.
    ///
    /// Returns `None` if the countdown is disarmed.
    pub fn step(&mut self) -> Option<CountdownTick> {
        self.remaining?;
        self.next_tick = Some(Instant::now() + self.interval);
        Some(self.apply_tick())
    }

    fn apply_tick(&mut self) -> CountdownTick {
        let remaining = self.remaining.unwrap_or(1).saturating_sub(1);
        self.ticks_fired += 1;
        let expired = remaining == 0;
        if expired {
            self.remaining = None;
            self.next_tick = None;
        } else {
            self.remaining = Some(remaining);
        }
        trace!(remaining, expired, "countdown tick");
        CountdownTick { remaining, expired }
    }
}
