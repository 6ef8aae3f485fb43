use crate::rate_limit::{RateLimitConfig, RateLimiter};
use speakd_core::Synthesizer;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared handler state. Per-request buffers live in the runner, never here; the only
/// mutable piece is the request limiter.
#[derive(Clone)]
pub struct AppState {
    pub synthesizer: Arc<Synthesizer>,
    pub limiter: Arc<Mutex<RateLimiter>>,
}

impl AppState {
    /// State with no request limit.
    pub fn new(synthesizer: Synthesizer) -> Self {
        Self::with_rate_limit(synthesizer, RateLimitConfig::unlimited())
    }

    pub fn with_rate_limit(synthesizer: Synthesizer, limit: RateLimitConfig) -> Self {
        Self {
            synthesizer: Arc::new(synthesizer),
            limiter: Arc::new(Mutex::new(RateLimiter::new(limit))),
        }
    }
}
