//! # Rate Limiter Module
//!
//! Admission control for the primary OCR provider. Enforces a sliding
//! call-count window and a minimum gap between consecutive calls by
//! suspending the caller, never by rejecting. These limits come from the
//! provider itself and apply even when quota remains, so the limiter is
//! consulted on every primary attempt and only on primary attempts.

use log::debug;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::config::RateLimitConfig;

#[derive(Debug)]
struct WindowState {
    calls_in_window: u32,
    window_started: Instant,
    last_call: Option<Instant>,
}

/// Sliding-window rate limiter with a minimum inter-call gap
///
/// State sits behind a `tokio::sync::Mutex` that is held across the
/// suspension points, so concurrent requests are admitted one at a time
/// and cannot both pass a window check that only one should pass. A caller
/// cancelled mid-wait drops the guard without recording a call, leaving
/// the window state untouched.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<WindowState>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a rate limiter with the given window and gap settings
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            state: Mutex::new(WindowState {
                calls_in_window: 0,
                window_started: Instant::now(),
                last_call: None,
            }),
            config,
        }
    }

    /// Suspend until it is safe to call the primary provider, then record the call
    ///
    /// Two independent checks run in order:
    /// 1. Window: once `max_calls_per_window` calls have been admitted, wait
    ///    out the remainder of the window, then slide it forward.
    /// 2. Gap: wait until `min_gap` has elapsed since the previous call.
    ///
    /// The call is recorded exactly once, after both checks pass.
    pub async fn await_slot(&self) {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        if now.duration_since(state.window_started) >= self.config.window {
            state.window_started = now;
            state.calls_in_window = 0;
        }

        if state.calls_in_window >= self.config.max_calls_per_window {
            let elapsed = now.duration_since(state.window_started);
            let wait = self.config.window.saturating_sub(elapsed);
            debug!("Rate window full, delaying caller for {}ms", wait.as_millis());
            sleep(wait).await;
            state.window_started = Instant::now();
            state.calls_in_window = 0;
        }

        if let Some(last_call) = state.last_call {
            let since_last = Instant::now().duration_since(last_call);
            if since_last < self.config.min_gap {
                let wait = self.config.min_gap - since_last;
                debug!("Minimum call gap not met, delaying for {}ms", wait.as_millis());
                sleep(wait).await;
            }
        }

        state.calls_in_window += 1;
        state.last_call = Some(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
