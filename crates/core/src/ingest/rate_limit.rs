//! Pacing between upstream requests during a seeding job.

use anyhow::Context;
use governor::{Quota, RateLimiter as Governor};
use std::num::NonZeroU32;
use std::time::Duration;

type DirectLimiter = Governor<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Suspends until the next request may go out.
    async fn wait(&self);
}

/// Sleeps a fixed delay on every call.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }
}

#[async_trait::async_trait]
impl RateLimiter for FixedDelay {
    async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Token bucket allowing `burst` immediate requests, refilled one token per
/// `period`.
pub struct TokenBucket {
    limiter: DirectLimiter,
}

impl TokenBucket {
    pub fn new(period: Duration, burst: u32) -> anyhow::Result<Self> {
        let burst = NonZeroU32::new(burst).context("token bucket burst must be non-zero")?;
        let quota = Quota::with_period(period)
            .context("token bucket period must be non-zero")?
            .allow_burst(burst);
        Ok(Self {
            limiter: Governor::direct(quota),
        })
    }
}

#[async_trait::async_trait]
impl RateLimiter for TokenBucket {
    async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

#[async_trait::async_trait]
impl RateLimiter for Unlimited {
    async fn wait(&self) {}
}
