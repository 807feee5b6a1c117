//! floodgate-core - Rate-limited reverse proxy components
//!
//! This crate provides the building blocks of a TCP-level gatekeeper:
//! it accepts client connections, decides per client IP whether to admit,
//! delay, or reject each request, and relays admitted requests to a fixed
//! backend with rate-limit metadata injected into the response.
//!
//! # Overview
//!
//! Two interchangeable algorithms implement the admission decision:
//!
//! - **Token bucket** - per-IP bucket with lazy refill; the decision is
//!   synchronous and admitted requests are forwarded inline.
//! - **Leaky bucket** - per-IP bounded FIFO queue drained by a background
//!   worker at a fixed cadence; admission means the request was queued.
//!
//! The active algorithm is swapped wholesale when the configuration
//! changes, between connections and without restarting the listener.
//! Configuration reaches the core through the [`ConfigSource`] trait;
//! loading and watching config files is the caller's business.
//!
//! # Modules
//!
//! - [`config`] - configuration snapshot types and [`ConfigSource`]
//! - [`error`] - error types and result alias
//! - [`headers`] - rate-limit header constants and raw HTTP helpers
//! - [`forwarder`] - single-shot request/response relay
//! - [`limiter`] - the two algorithms behind [`RateLimitAlgorithm`]
//! - [`server`] - accept loop, config hot-swap, graceful shutdown

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod forwarder;
pub mod headers;
pub mod limiter;
pub mod server;
#[cfg(test)]
pub mod test_utils;
pub mod types;

// Re-export commonly used items at crate root
pub use config::{Algorithm, CommonConfig, Config, ConfigSource, LeakyBucketConfig, TokenBucketConfig};
pub use error::{FloodgateError, Result};
pub use forwarder::Forwarder;
pub use limiter::{
    LeakyBucketLimiter, LeakyBucketSettings, RateLimitAlgorithm, TokenBucketLimiter,
    TokenBucketSettings, build_algorithm,
};
pub use server::{Server, ServerState, ShutdownHandle};
pub use types::{RateLimitQuota, RequestEnvelope};
