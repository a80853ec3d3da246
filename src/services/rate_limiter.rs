//! Per-client sliding-window rate limiter.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Length of the trailing window every client is measured against.
pub const WINDOW: Duration = Duration::from_secs(1);

/// Idle clients are swept once every this many admit checks.
const SWEEP_EVERY: u64 = 1024;

/// Admits at most `limit` requests per client in any trailing [`WINDOW`].
///
/// Each client's timestamps live in their own map entry, so concurrent
/// checks for different clients only contend on the shard lock, and checks
/// for the same client are serialized by the entry guard.
pub struct RateLimiter {
    limit: usize,
    clients: DashMap<String, VecDeque<Instant>>,
    checks: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter admitting `limit` requests per second per client.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            clients: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    /// Record a request from `client_id` if it fits in the window.
    pub fn admit(&self, client_id: &str) -> bool {
        self.check(client_id, Instant::now)
    }

    /// [`admit`](Self::admit) against an explicit clock reading.
    pub fn admit_at(&self, client_id: &str, now: Instant) -> bool {
        self.check(client_id, || now)
    }

    /// The clock is read while holding the client's entry so each window
    /// stays in timestamp order.
    fn check(&self, client_id: &str, clock: impl FnOnce() -> Instant) -> bool {
        let (admitted, now) = {
            let mut window = self.clients.entry(client_id.to_owned()).or_default();
            let now = clock();
            while window
                .front()
                .is_some_and(|&ts| now.saturating_duration_since(ts) >= WINDOW)
            {
                window.pop_front();
            }
            if window.len() >= self.limit {
                (false, now)
            } else {
                window.push_back(now);
                (true, now)
            }
        };

        // The entry guard must be dropped before sweeping the map.
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.purge_idle_at(now);
        }

        if !admitted {
            debug!("Rate limit hit for client {}", client_id);
        }
        admitted
    }

    /// Drop clients whose most recent request has left the window.
    pub fn purge_idle_at(&self, now: Instant) -> usize {
        let before = self.clients.len();
        self.clients.retain(|_, window| {
            window
                .back()
                .is_some_and(|&last| now.saturating_duration_since(last) < WINDOW)
        });
        let purged = before.saturating_sub(self.clients.len());
        if purged > 0 {
            debug!("Purged {} idle rate-limit windows", purged);
        }
        purged
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}
