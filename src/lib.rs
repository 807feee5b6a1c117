//! floodgate - A rate-limited reverse proxy
//!
//! floodgate is a TCP-level gatekeeper: it accepts client connections,
//! decides per client IP whether to admit, delay, or reject each request,
//! and relays admitted requests to a fixed backend with rate-limit
//! metadata injected into the response.
//!
//! # Overview
//!
//! - Two rate-limiting algorithms: token bucket (synchronous, inline
//!   forwarding) and leaky bucket (per-IP queue drained by a background
//!   worker)
//! - Hot-swappable configuration from a watched YAML file, applied between
//!   connections without dropping in-flight work
//! - Graceful shutdown draining every per-client worker
//! - Structured logging with optional JSON output
//!
//! # Modules
//!
//! - [`args`] - Command line argument parsing
//! - [`config_manager`] - YAML configuration loading and hot-reload
//! - [`server`] - Startup output
//!
//! # Re-exports from floodgate-core
//!
//! Core functionality is provided by the `floodgate-core` crate:
//! - [`limiter`] - the token bucket and leaky bucket algorithms
//! - [`forwarder`] - single-shot request/response relay
//! - [`core_server`](floodgate_core::server) - accept loop and hot-swap

#![forbid(unsafe_code)]

pub mod args;
pub mod config_manager;
pub mod server;

// Re-export floodgate-core modules
pub use floodgate_core::config;
pub use floodgate_core::error;
pub use floodgate_core::forwarder;
pub use floodgate_core::headers;
pub use floodgate_core::limiter;
pub use floodgate_core::types;

// Re-export commonly used items at crate root
pub use config_manager::ConfigManager;
pub use floodgate_core::{
    Algorithm,
    Config,
    ConfigSource,
    FloodgateError,
    Forwarder,
    RateLimitAlgorithm,
    RateLimitQuota,
    RequestEnvelope,
    Result,
    Server,
    ServerState,
    ShutdownHandle,
};
