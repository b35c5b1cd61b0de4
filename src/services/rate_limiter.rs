//! Rate limiter for login attempts
//!
//! Two sliding windows guard the login form:
//! - failed attempts per identifier (5 per 15 minutes)
//! - requests per client IP (10 per minute)

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

pub const MAX_FAILED_ATTEMPTS: usize = 5;
pub const FAILED_ATTEMPT_WINDOW_MINUTES: i64 = 15;
pub const MAX_IP_REQUESTS: usize = 10;
pub const IP_WINDOW_MINUTES: i64 = 1;

/// Timestamps per key, pruned to the last `window`
struct SlidingWindow<K> {
    limit: usize,
    window: Duration,
    hits: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: Eq + Hash> SlidingWindow<K> {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: RwLock::new(HashMap::new()),
        }
    }

    async fn is_limited(&self, key: K) -> bool {
        let cutoff = Utc::now() - self.window;
        let mut hits = self.hits.write().await;
        let times = hits.entry(key).or_default();
        times.retain(|t| *t > cutoff);
        times.len() >= self.limit
    }

    async fn record(&self, key: K) {
        self.hits.write().await.entry(key).or_default().push(Utc::now());
    }

    async fn clear(&self, key: &K) {
        self.hits.write().await.remove(key);
    }

    async fn prune(&self) -> usize {
        let cutoff = Utc::now() - self.window;
        let mut hits = self.hits.write().await;
        hits.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
        hits.len()
    }
}

/// Login rate limiter
pub struct LoginRateLimiter {
    failures: SlidingWindow<String>,
    requests: SlidingWindow<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            failures: SlidingWindow::new(
                MAX_FAILED_ATTEMPTS,
                Duration::minutes(FAILED_ATTEMPT_WINDOW_MINUTES),
            ),
            requests: SlidingWindow::new(MAX_IP_REQUESTS, Duration::minutes(IP_WINDOW_MINUTES)),
        }
    }

    /// Whether the username or email has too many recent failures.
    /// Identifiers compare case-insensitively.
    pub async fn is_identifier_limited(&self, identifier: &str) -> bool {
        self.failures.is_limited(identifier_key(identifier)).await
    }

    pub async fn record_failed_attempt(&self, identifier: &str) {
        self.failures.record(identifier_key(identifier)).await;
    }

    /// Forget failures after a successful login
    pub async fn clear_identifier(&self, identifier: &str) {
        self.failures.clear(&identifier_key(identifier)).await;
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.requests.is_limited(ip).await
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.requests.record(ip).await;
    }

    /// Drop entries that fell out of their window. Returns the number of
    /// keys still tracked.
    pub async fn cleanup(&self) -> usize {
        self.failures.prune().await + self.requests.prune().await
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn identifier_key(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}
