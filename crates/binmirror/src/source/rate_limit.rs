//! Proactive request pacing for rate-limited upstream APIs.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default request rates (requests per second).
pub mod rate_limits {
    /// GitHub REST: 5000 requests/hour authenticated; listing a release feed
    /// takes a handful of pages, so a small burst rate is plenty.
    pub const GITHUB_DEFAULT_RPS: u32 = 5;
    /// Anonymous GitHub allows 60 requests/hour.
    pub const GITHUB_ANONYMOUS_RPS: u32 = 1;
}

/// A shared governor rate limiter.
///
/// Cloning shares the underlying quota, so every clone paces the same budget.
///
/// # Example
///
/// ```ignore
/// let limiter = ApiRateLimiter::new(5);
/// limiter.wait().await;
/// client.get(url).await?;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
    requests_per_second: u32,
}

impl ApiRateLimiter {
    /// Create a limiter; `0` is treated as 1 request per second.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
            requests_per_second: rps.get(),
        }
    }

    /// Wait until the quota admits another request.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }

    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }
}

impl std::fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimiter")
            .field("requests_per_second", &self.requests_per_second)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn zero_rps_is_clamped_to_one() {
        assert_eq!(ApiRateLimiter::new(0).requests_per_second(), 1);
        assert_eq!(ApiRateLimiter::new(7).requests_per_second(), 7);
    }

    #[tokio::test]
    async fn wait_admits_burst_immediately() {
        let limiter = ApiRateLimiter::new(100);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.wait().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn clones_share_quota() {
        let limiter = ApiRateLimiter::new(1);
        let clone = limiter.clone();
        limiter.wait().await;
        let start = Instant::now();
        clone.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(500));
    }
}
