//! # Rate Limiting
//!
//! Fixed-window counters keyed by client address, shared by both submission endpoints.
//! Callers namespace the key per flow so each flow keeps its own budget.
//!
//! Counters live in process memory only. A restart forgets every window, and clients
//! without an address all share the `unknown` key. It deters casual abuse and is not a
//! security boundary. Put a shared counter behind [`RateLimiter`] to go beyond one process.
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::RatePolicy;

/// Expired windows are swept once the map grows past this.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, key: &str, policy: &RatePolicy) -> RateDecision;
}

#[derive(Debug, Clone)]
struct Window {
    count: u32,
    reset_at: Instant,
}

#[derive(Default)]
pub struct WindowLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl WindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn check_at(&self, key: &str, policy: &RatePolicy, now: Instant) -> RateDecision {
        let mut windows = self.windows.lock().await;

        if windows.len() > SWEEP_THRESHOLD {
            windows.retain(|_, window| window.reset_at > now);
        }

        let window = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at: now,
        });

        if now >= window.reset_at {
            window.count = 1;
            window.reset_at = now + policy.window;
            return RateDecision::Allowed;
        }

        window.count = window.count.saturating_add(1);
        if window.count > policy.max_requests {
            return RateDecision::Limited {
                retry_after: window.reset_at - now,
            };
        }

        RateDecision::Allowed
    }
}

#[async_trait]
impl RateLimiter for WindowLimiter {
    async fn check(&self, key: &str, policy: &RatePolicy) -> RateDecision {
        self.check_at(key, policy, Instant::now()).await
    }
}
