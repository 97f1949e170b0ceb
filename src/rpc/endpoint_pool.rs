//! Endpoint pool with strike-counted, cooldown-gated rotation
//!
//! Providers are interchangeable. The pool hands out the active one and
//! rotates to the next (wrapping) only when BOTH:
//! - the strike counter reached `strike_limit`
//! - `cooldown` has elapsed since the last rotation (or pool creation)
//!
//! Successful calls decrement the strike counter by one, so isolated errors
//! heal without forcing a rotation. The pool never gives up: it cycles
//! through the list indefinitely.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use super::types::ProviderError;

/// Shared handle to the pool; read and rotated by one polling tick at a time.
pub type SharedEndpointPool = Arc<Mutex<EndpointPool>>;

/// Lock the shared pool. A poisoned lock only means a holder panicked
/// mid-update; index and counter are still valid, so the guard is recovered.
pub fn lock_pool(pool: &SharedEndpointPool) -> MutexGuard<'_, EndpointPool> {
    pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One provider: primary JSON-RPC URL plus its streaming URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub rpc_url: String,
    pub ws_url: String,
}

impl Endpoint {
    pub fn new(rpc_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            ws_url: ws_url.into(),
        }
    }

    /// Pair an RPC URL with the streaming URL on the same host.
    pub fn from_rpc_url(rpc_url: impl Into<String>) -> Self {
        let rpc_url = rpc_url.into();
        let ws_url = if let Some(rest) = rpc_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = rpc_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            rpc_url.clone()
        };
        Self { rpc_url, ws_url }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    Connectivity,
}

/// Result of a rotation, for logging and reconnecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    pub from: Endpoint,
    pub to: Endpoint,
}

#[derive(Debug)]
pub struct EndpointPool {
    endpoints: Vec<Endpoint>,
    index: usize,
    strikes: u32,
    strike_limit: u32,
    cooldown: Duration,
    last_rotation: Instant,
}

impl EndpointPool {
    /// Create a pool over `endpoints` in rotation order. `None` when the list
    /// is empty.
    pub fn new(endpoints: Vec<Endpoint>, strike_limit: u32, cooldown: Duration) -> Option<Self> {
        if endpoints.is_empty() {
            return None;
        }

        log::info!("🔗 Endpoint pool initialized with {} providers", endpoints.len());
        for (idx, endpoint) in endpoints.iter().enumerate() {
            log::debug!("   [{}] {}", idx, endpoint.rpc_url);
        }

        Some(Self {
            endpoints,
            index: 0,
            strikes: 0,
            strike_limit: strike_limit.max(1),
            cooldown,
            last_rotation: Instant::now(),
        })
    }

    pub fn shared(self) -> SharedEndpointPool {
        Arc::new(Mutex::new(self))
    }

    /// The active endpoint.
    pub fn current(&self) -> &Endpoint {
        &self.endpoints[self.index]
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn strikes(&self) -> u32 {
        self.strikes
    }

    pub fn record_failure(&mut self, kind: FailureKind) {
        self.strikes = self.strikes.saturating_add(1);
        log::debug!(
            "Endpoint {} strike {}/{} ({:?})",
            self.current().rpc_url,
            self.strikes,
            self.strike_limit,
            kind
        );
    }

    pub fn record_success(&mut self) {
        self.strikes = self.strikes.saturating_sub(1);
    }

    pub fn should_rotate(&self) -> bool {
        self.strikes >= self.strike_limit && self.last_rotation.elapsed() >= self.cooldown
    }

    /// Advance to the next endpoint (wrapping), reset strikes, stamp the time.
    pub fn rotate(&mut self) -> Rotation {
        let from = self.current().clone();
        self.index = (self.index + 1) % self.endpoints.len();
        self.strikes = 0;
        self.last_rotation = Instant::now();
        let to = self.current().clone();

        log::warn!("🔄 Rotating endpoint: {} → {}", from.rpc_url, to.rpc_url);
        Rotation { from, to }
    }

    /// Record a failure and rotate if the policy says so.
    pub fn fail_and_maybe_rotate(&mut self, kind: FailureKind) -> Option<Rotation> {
        self.record_failure(kind);
        if self.should_rotate() {
            Some(self.rotate())
        } else {
            None
        }
    }

    /// Feed the outcome of one call made against `used` (`None` = success).
    /// Outcomes from an endpoint the pool has already rotated away from are
    /// ignored, so a stale caller cannot strike its replacement.
    pub fn record_outcome(&mut self, used: &Endpoint, error: Option<&ProviderError>) -> Option<Rotation> {
        if used != self.current() {
            return None;
        }
        match error {
            None => {
                self.record_success();
                None
            }
            Some(ProviderError::RateLimited) => self.fail_and_maybe_rotate(FailureKind::RateLimited),
            Some(ProviderError::Network(_)) => self.fail_and_maybe_rotate(FailureKind::Connectivity),
            Some(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> EndpointPool {
        let endpoints = (0..n)
            .map(|i| Endpoint::from_rpc_url(format!("https://rpc-{}.example", i)))
            .collect();
        EndpointPool::new(endpoints, 3, Duration::from_secs(30)).unwrap()
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(EndpointPool::new(Vec::new(), 3, Duration::from_secs(30)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcomes_from_rotated_endpoint_ignored() {
        let mut pool = pool(3);
        tokio::time::advance(Duration::from_secs(30)).await;
        let first = pool.current().clone();

        for _ in 0..3 {
            pool.record_outcome(&first, Some(&ProviderError::RateLimited));
        }
        assert_eq!(pool.current_index(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        for _ in 0..5 {
            assert!(pool.record_outcome(&first, Some(&ProviderError::RateLimited)).is_none());
        }
        assert_eq!(pool.current_index(), 1);
        assert_eq!(pool.strikes(), 0);

        let second = pool.current().clone();
        pool.record_outcome(&second, Some(&ProviderError::Network("reset".to_string())));
        pool.record_outcome(&second, Some(&ProviderError::Malformed("eof".to_string())));
        assert_eq!(pool.strikes(), 1);
        pool.record_outcome(&second, None);
        assert_eq!(pool.strikes(), 0);
    }

    #[test]
    fn test_ws_url_derivation() {
        assert_eq!(Endpoint::from_rpc_url("https://a.example").ws_url, "wss://a.example");
        assert_eq!(Endpoint::from_rpc_url("http://localhost:8899").ws_url, "ws://localhost:8899");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fewer_strikes_than_limit_never_rotate() {
        let mut pool = pool(3);
        tokio::time::advance(Duration::from_secs(60)).await;

        pool.record_failure(FailureKind::RateLimited);
        pool.record_failure(FailureKind::Connectivity);
        assert!(!pool.should_rotate());
        assert_eq!(pool.current_index(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_strikes_within_cooldown_do_not_rotate() {
        let mut pool = pool(3);

        for _ in 0..3 {
            assert!(pool.fail_and_maybe_rotate(FailureKind::RateLimited).is_none());
        }
        assert!(!pool.should_rotate());
        assert_eq!(pool.current_index(), 0);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!pool.should_rotate());

        tokio::time::advance(Duration::from_secs(1)).await;
        let rotation = pool
            .fail_and_maybe_rotate(FailureKind::RateLimited)
            .expect("cooldown elapsed, should rotate");
        assert_eq!(rotation.from.rpc_url, "https://rpc-0.example");
        assert_eq!(rotation.to.rpc_url, "https://rpc-1.example");
        assert_eq!(pool.current_index(), 1);
        assert_eq!(pool.strikes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_wraps_to_first() {
        let mut pool = pool(2);

        for expected in [1, 0, 1] {
            tokio::time::advance(Duration::from_secs(30)).await;
            for _ in 0..3 {
                pool.record_failure(FailureKind::RateLimited);
            }
            assert!(pool.should_rotate());
            pool.rotate();
            assert_eq!(pool.current_index(), expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_decrements_strikes() {
        let mut pool = pool(2);
        tokio::time::advance(Duration::from_secs(30)).await;

        pool.record_failure(FailureKind::RateLimited);
        pool.record_failure(FailureKind::RateLimited);
        pool.record_success();
        assert_eq!(pool.strikes(), 1);

        pool.record_failure(FailureKind::RateLimited);
        assert!(!pool.should_rotate());

        pool.record_success();
        pool.record_success();
        pool.record_success();
        assert_eq!(pool.strikes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_restarts_after_rotation() {
        let mut pool = pool(3);
        tokio::time::advance(Duration::from_secs(30)).await;
        for _ in 0..3 {
            pool.record_failure(FailureKind::RateLimited);
        }
        pool.rotate();

        for _ in 0..5 {
            pool.record_failure(FailureKind::RateLimited);
        }
        assert!(!pool.should_rotate());
        assert_eq!(pool.current_index(), 1);
    }
}
