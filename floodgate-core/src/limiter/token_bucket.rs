//! Per-IP token bucket with lazy refill.
//!
//! Each client IP gets a bucket holding up to `capacity` tokens, initially
//! full. A request consumes one token; tokens come back at
//! `tokens_per_period` per elapsed whole period, computed lazily on access
//! (there is no background task). Partial periods never refill: elapsed
//! time is divided by the period with floor semantics.
//!
//! Timing uses the wall clock at whole-second resolution and is not
//! hardened against clock skew; a clock jumping backwards simply delays
//! the next refill.
//!
//! Buckets are never retired, so the map grows with the number of distinct
//! client IPs observed. Acceptable for the deployments this proxy targets;
//! revisit if it ever fronts the open internet.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::TokenBucketConfig;
use crate::error::Result;
use crate::forwarder::Forwarder;
use crate::limiter::{RateLimitAlgorithm, send_rejection};
use crate::types::{RateLimitQuota, RequestEnvelope};

/// Token bucket tuning, in the units the refill arithmetic works in.
#[derive(Clone, Copy, Debug)]
pub struct TokenBucketSettings {
    /// Length of one refill period, in whole seconds.
    pub period_secs: u64,
    /// Tokens added per elapsed period.
    pub tokens_per_period: u64,
    /// Maximum tokens a bucket holds; also the initial fill.
    pub capacity: u64,
}

impl From<&TokenBucketConfig> for TokenBucketSettings {
    fn from(config: &TokenBucketConfig) -> Self {
        Self {
            period_secs: config.period_secs,
            tokens_per_period: config.tokens_per_period,
            capacity: config.capacity,
        }
    }
}

/// One client's bucket state.
#[derive(Clone, Debug)]
struct TokenBucket {
    /// Tokens currently available. Invariant: `tokens <= capacity`.
    tokens: u64,
    /// Unix seconds of the last successful take; `None` until the first.
    last_refill: Option<u64>,
}

impl TokenBucket {
    fn new(capacity: u64) -> Self {
        Self {
            tokens: capacity,
            last_refill: None,
        }
    }

    /// Refills for the periods elapsed since the last take, then attempts
    /// to take one token. Returns false with the bucket untouched when
    /// empty.
    fn try_take(&mut self, now_secs: u64, settings: &TokenBucketSettings) -> bool {
        if let Some(last) = self.last_refill {
            let elapsed_periods = now_secs.saturating_sub(last) / settings.period_secs;
            let added = settings.tokens_per_period.saturating_mul(elapsed_periods);
            if added > 0 {
                self.tokens = self.tokens.saturating_add(added).min(settings.capacity);
                debug!(added, tokens = self.tokens, "refilled token bucket");
            }
        }
        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        self.last_refill = Some(now_secs);
        true
    }
}

/// Synchronous per-IP admission with inline forwarding.
///
/// The bucket map is owned exclusively by this instance and only ever
/// touched from the dispatcher's accept loop, so no locking is needed; the
/// price is that forwarding blocks the accept loop for one backend round
/// trip per admitted request.
pub struct TokenBucketLimiter {
    settings: TokenBucketSettings,
    forwarder: Forwarder,
    buckets: HashMap<String, TokenBucket>,
}

impl TokenBucketLimiter {
    /// Creates a limiter with an empty bucket map.
    pub fn new(settings: TokenBucketSettings, forwarder: Forwarder) -> Self {
        Self {
            settings,
            forwarder,
            buckets: HashMap::new(),
        }
    }

    fn quota(&self, remaining: u64) -> RateLimitQuota {
        RateLimitQuota {
            remaining,
            limit: self.settings.capacity,
            retry_after_secs: self.settings.period_secs,
        }
    }
}

#[async_trait]
impl RateLimitAlgorithm for TokenBucketLimiter {
    async fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    async fn handle(&mut self, envelope: RequestEnvelope) -> Result<()> {
        debug!(client = %envelope.client_address(), "handling request");
        let bucket = self
            .buckets
            .entry(envelope.client_ip.clone())
            .or_insert_with(|| {
                debug!(client_ip = %envelope.client_ip, "creating token bucket");
                TokenBucket::new(self.settings.capacity)
            });

        if bucket.try_take(unix_now_secs(), &self.settings) {
            let remaining = bucket.tokens;
            info!(
                client = %envelope.client_address(),
                remaining,
                limit = self.settings.capacity,
                "token taken, forwarding request"
            );
            self.forwarder.forward(envelope, self.quota(remaining)).await
        } else {
            info!(
                client = %envelope.client_address(),
                "token bucket is empty, rejecting request"
            );
            send_rejection(envelope, self.quota(0)).await
        }
    }

    async fn teardown(&mut self) -> Result<()> {
        Ok(())
    }
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
