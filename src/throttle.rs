use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::InMemoryState;
use governor::state::direct::NotKeyed;
use governor::{Quota, RateLimiter};

/// Process-wide bandwidth cap shared by every transfer
pub type SharedThrottle = Arc<Throttle>;

/// Token bucket measured in bytes per second
pub struct Throttle {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    burst: NonZeroU32,
}

impl Throttle {
    /// Allow `bytes_per_second` on average, with bursts of up to one second worth of data
    pub fn per_second(bytes_per_second: NonZeroU32) -> Self {
        Self {
            limiter: RateLimiter::direct(Quota::per_second(bytes_per_second)),
            burst: bytes_per_second,
        }
    }

    /// Create a shared throttle, or `None` when no limit was requested
    pub fn shared(bytes_per_second: Option<u32>) -> Option<SharedThrottle> {
        bytes_per_second
            .and_then(NonZeroU32::new)
            .map(|rate| Arc::new(Self::per_second(rate)))
    }

    /// Wait until `len` bytes may pass.
    ///
    /// Chunks larger than the bucket are admitted in bucket-sized steps.
    pub async fn consume(&self, len: usize) {
        let burst = self.burst.get() as usize;
        let mut remaining = len;

        while remaining > 0 {
            let step = remaining.min(burst);
            if let Some(n) = u32::try_from(step).ok().and_then(NonZeroU32::new) {
                // step <= burst
                let _ = self.limiter.until_n_ready(n).await;
            }
            remaining -= step;
        }
    }
}
