//! Process-wide budget for JSON repair work
//!
//! Repair is cheap per call but pathological inputs can make it add up. The
//! breaker admits a fixed number of repairs and a fixed amount of repair
//! time per window; once either runs out, repairs in that window are
//! refused until the window rolls over.

use crate::config::RepairConfig;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug)]
struct BreakerWindow {
    started: Instant,
    attempts: u32,
    elapsed: Duration,
    tripped: bool,
}

impl BreakerWindow {
    fn new(started: Instant) -> Self {
        Self {
            started,
            attempts: 0,
            elapsed: Duration::ZERO,
            tripped: false,
        }
    }
}

/// Snapshot of the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerState {
    pub attempts_in_window: u32,
    pub elapsed_in_window: Duration,
    pub open: bool,
}

/// Shared attempt and time budget per rolling window.
///
/// Check-and-reset happens under a single lock, so two tasks racing past an
/// expired window cannot both reset it.
#[derive(Debug)]
pub struct RepairCircuitBreaker {
    max_attempts: u32,
    max_elapsed: Duration,
    window: Duration,
    state: Mutex<BreakerWindow>,
}

impl RepairCircuitBreaker {
    pub fn new(max_attempts: u32, max_elapsed: Duration, window: Duration) -> Self {
        Self {
            max_attempts,
            max_elapsed,
            window,
            state: Mutex::new(BreakerWindow::new(Instant::now())),
        }
    }

    pub fn from_config(config: &RepairConfig) -> Self {
        Self::new(
            config.max_attempts_per_window,
            Duration::from_millis(config.max_time_per_window_ms),
            Duration::from_millis(config.window_ms),
        )
    }

    /// Claim one repair slot; `false` means the breaker is open
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut window = self.state.lock();
        self.roll(&mut window, now);

        if window.attempts >= self.max_attempts || window.elapsed >= self.max_elapsed {
            if !window.tripped {
                window.tripped = true;
                warn!(
                    attempts = window.attempts,
                    elapsed_ms = window.elapsed.as_millis() as u64,
                    "json repair circuit breaker opened"
                );
            }
            return false;
        }

        window.attempts += 1;
        true
    }

    /// Charge repair time to the current window
    pub fn record_elapsed(&self, elapsed: Duration) {
        self.state.lock().elapsed += elapsed;
    }

    pub fn state(&self) -> CircuitBreakerState {
        self.state_at(Instant::now())
    }

    pub fn state_at(&self, now: Instant) -> CircuitBreakerState {
        let mut window = self.state.lock();
        self.roll(&mut window, now);
        CircuitBreakerState {
            attempts_in_window: window.attempts,
            elapsed_in_window: window.elapsed,
            open: window.attempts >= self.max_attempts || window.elapsed >= self.max_elapsed,
        }
    }

    fn roll(&self, window: &mut BreakerWindow, now: Instant) {
        if now.saturating_duration_since(window.started) >= self.window {
            *window = BreakerWindow::new(now);
        }
    }
}

impl Default for RepairCircuitBreaker {
    fn default() -> Self {
        Self::from_config(&RepairConfig::default())
    }
}
