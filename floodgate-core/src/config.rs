//! Configuration snapshot types and the [`ConfigSource`] injection trait.
//!
//! A [`Config`] is an immutable snapshot: it is replaced wholesale when the
//! configuration changes, never mutated in place. The core does not load
//! configuration itself; it consumes snapshots through [`ConfigSource`],
//! which callers implement over whatever storage they use (the CLI crate
//! implements it over a polled YAML file, tests over an in-memory value).

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

/// Default interval between leaky-bucket drain cycles, in seconds.
const DEFAULT_PERIOD_SECS: u64 = 1;

/// Rate-limiting algorithm selector.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Per-IP token bucket with lazy refill; admission decided inline.
    TokenBucket,
    /// Per-IP bounded queue drained by a background worker at a fixed rate.
    LeakyBucket,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokenBucket => f.write_str("token_bucket"),
            Self::LeakyBucket => f.write_str("leaky_bucket"),
        }
    }
}

/// Settings shared by both algorithms.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CommonConfig {
    /// Host the forwarder connects to.
    pub forward_host: String,
    /// Port the forwarder connects to.
    pub forward_port: u16,
    /// Maximum bytes read per socket operation; also bounds the relayed
    /// request and response payloads.
    pub socket_buf_size: usize,
    /// Which rate-limiting algorithm handles accepted connections.
    pub rate_limit_algorithm: Algorithm,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            forward_host: "127.0.0.1".to_string(),
            forward_port: 8080,
            socket_buf_size: 1024,
            rate_limit_algorithm: Algorithm::TokenBucket,
        }
    }
}

/// Token bucket tuning.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TokenBucketConfig {
    /// Length of one refill period, in whole seconds.
    pub period_secs: u64,
    /// Tokens added per elapsed period.
    pub tokens_per_period: u64,
    /// Maximum tokens a bucket can hold; also the initial fill.
    pub capacity: u64,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            period_secs: DEFAULT_PERIOD_SECS,
            tokens_per_period: 1,
            capacity: 10,
        }
    }
}

/// Leaky bucket tuning.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LeakyBucketConfig {
    /// Length of one drain cycle, in whole seconds.
    pub period_secs: u64,
    /// Requests forwarded per drain cycle.
    pub drain_per_period: usize,
    /// Bounded queue capacity per client IP.
    pub queue_size: usize,
    /// Consecutive empty drain cycles before a worker retires itself.
    pub idle_cycles: u32,
}

impl Default for LeakyBucketConfig {
    fn default() -> Self {
        Self {
            period_secs: DEFAULT_PERIOD_SECS,
            drain_per_period: 1,
            queue_size: 10,
            idle_cycles: 10,
        }
    }
}

impl LeakyBucketConfig {
    /// Drain cycle length as a [`Duration`].
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

/// Immutable configuration snapshot consumed by the dispatcher.
///
/// # Example
///
/// ```
/// use floodgate_core::config::{Algorithm, Config};
///
/// let config = Config::default();
/// assert_eq!(config.common.rate_limit_algorithm, Algorithm::TokenBucket);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Settings shared by both algorithms.
    pub common: CommonConfig,
    /// Token bucket tuning, used when `rate_limit_algorithm` selects it.
    pub token_bucket: TokenBucketConfig,
    /// Leaky bucket tuning, used when `rate_limit_algorithm` selects it.
    pub leaky_bucket: LeakyBucketConfig,
}

impl Config {
    /// Returns `host:port` of the backend.
    pub fn forward_address(&self) -> String {
        format!("{}:{}", self.common.forward_host, self.common.forward_port)
    }

    /// Checks every field that would otherwise fail at runtime.
    ///
    /// Zero periods would divide by zero during refill, a zero buffer would
    /// relay nothing, and zero capacities would reject every request.
    pub fn validate(&self) -> Result<(), String> {
        if self.common.forward_host.is_empty() {
            return Err("common.forward_host must not be empty".to_string());
        }
        if self.common.forward_port == 0 {
            return Err("common.forward_port must be greater than 0".to_string());
        }
        if self.common.socket_buf_size == 0 {
            return Err("common.socket_buf_size must be greater than 0".to_string());
        }
        if self.token_bucket.period_secs == 0 {
            return Err("token_bucket.period_secs must be greater than 0".to_string());
        }
        if self.token_bucket.tokens_per_period == 0 {
            return Err("token_bucket.tokens_per_period must be greater than 0".to_string());
        }
        if self.token_bucket.capacity == 0 {
            return Err("token_bucket.capacity must be greater than 0".to_string());
        }
        if self.leaky_bucket.period_secs == 0 {
            return Err("leaky_bucket.period_secs must be greater than 0".to_string());
        }
        if self.leaky_bucket.drain_per_period == 0 {
            return Err("leaky_bucket.drain_per_period must be greater than 0".to_string());
        }
        if self.leaky_bucket.queue_size == 0 {
            return Err("leaky_bucket.queue_size must be greater than 0".to_string());
        }
        if self.leaky_bucket.idle_cycles == 0 {
            return Err("leaky_bucket.idle_cycles must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Source of configuration snapshots for the dispatcher.
///
/// The dispatcher polls [`is_changed`](ConfigSource::is_changed) once per
/// accepted connection and, when it reports true, swaps the active
/// algorithm for one built from [`current`](ConfigSource::current).
pub trait ConfigSource: Send + Sync + 'static {
    /// Returns the latest snapshot and clears the changed flag.
    fn current(&self) -> Arc<Config>;

    /// Returns true if a new snapshot arrived since [`current`](ConfigSource::current)
    /// was last called.
    fn is_changed(&self) -> bool;
}
