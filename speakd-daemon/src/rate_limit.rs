//! Sliding-window limit on synthesis requests. Every admitted request spawns an engine.

use serde::Deserialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_REQUESTS: u32 = 50;
pub const DEFAULT_WINDOW_SECS: u64 = 15 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per window. 0 means unlimited.
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

impl RateLimitConfig {
    pub fn unlimited() -> Self {
        Self {
            max_requests: 0,
            ..Self::default()
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    admitted: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window(),
            admitted: VecDeque::new(),
        }
    }

    /// Admit a request now, or refuse it if the window is full.
    pub fn check(&mut self) -> bool {
        self.check_at(Instant::now())
    }

    fn check_at(&mut self, now: Instant) -> bool {
        if self.max_requests == 0 {
            return true;
        }
        while let Some(oldest) = self.admitted.front() {
            if now.duration_since(*oldest) < self.window {
                break;
            }
            self.admitted.pop_front();
        }
        if self.admitted.len() >= self.max_requests as usize {
            return false;
        }
        self.admitted.push_back(now);
        true
    }
}
