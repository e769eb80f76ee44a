//! Per-provider token bucket.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::GatewayError;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Classic token bucket: `burst` tokens, refilled at `per_second`.
pub struct TokenBucket {
    per_second: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(per_second: f64, burst: u32) -> Result<Self, GatewayError> {
        if !(per_second.is_finite() && per_second > 0.0) || burst == 0 {
            return Err(GatewayError::InvalidRateLimit { per_second, burst });
        }
        let burst = f64::from(burst);
        Ok(Self {
            per_second,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        })
    }

    /// Wait until a token is available, then take it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.per_second).min(self.burst);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.per_second)
            };
            tokio::time::sleep(wait).await;
        }
    }
}
