//! Rate-limiting algorithms.
//!
//! Exactly two implementations sit behind [`RateLimitAlgorithm`]:
//!
//! - [`TokenBucketLimiter`] decides synchronously and forwards inline.
//! - [`LeakyBucketLimiter`] enqueues and lets a per-client worker forward
//!   at a fixed cadence.
//!
//! A configuration change never mutates a live instance: the dispatcher
//! tears the old instance down, builds a fresh one from the new snapshot,
//! and sets it up before handling the next connection.

mod leaky_bucket;
mod token_bucket;

pub use leaky_bucket::{LeakyBucketLimiter, LeakyBucketSettings};
pub use token_bucket::{TokenBucketLimiter, TokenBucketSettings};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::{Algorithm, Config};
use crate::error::Result;
use crate::forwarder::Forwarder;
use crate::headers;
use crate::types::{RateLimitQuota, RequestEnvelope};

/// An admission-control algorithm owning all of its per-client state.
#[async_trait]
pub trait RateLimitAlgorithm: Send {
    /// Prepares background resources before the first request.
    async fn setup(&mut self) -> Result<()>;

    /// Decides admission for one accepted connection and disposes of it:
    /// forwards, enqueues for later forwarding, or rejects with a 429.
    /// Recoverable conditions never surface here; an error return is fatal.
    async fn handle(&mut self, envelope: RequestEnvelope) -> Result<()>;

    /// Releases all per-client resources. No forwarding happens after this
    /// returns.
    async fn teardown(&mut self) -> Result<()>;
}

/// Builds the algorithm instance selected by the snapshot.
pub fn build_algorithm(config: &Config) -> Box<dyn RateLimitAlgorithm> {
    debug!(
        algorithm = %config.common.rate_limit_algorithm,
        "creating rate limit algorithm instance"
    );
    let forwarder = Forwarder::new(
        config.common.forward_host.clone(),
        config.common.forward_port,
        config.common.socket_buf_size,
    );
    match config.common.rate_limit_algorithm {
        Algorithm::TokenBucket => Box::new(TokenBucketLimiter::new(
            TokenBucketSettings::from(&config.token_bucket),
            forwarder,
        )),
        Algorithm::LeakyBucket => Box::new(LeakyBucketLimiter::new(
            LeakyBucketSettings::from(&config.leaky_bucket),
            forwarder,
        )),
    }
}

/// Answers a rejected request with a 429 and closes the connection.
pub(crate) async fn send_rejection(
    mut envelope: RequestEnvelope,
    quota: RateLimitQuota,
) -> Result<()> {
    let response = headers::too_many_requests_response(&quota);
    let outcome = envelope.stream.write_all(&response).await;
    if let Err(err) = envelope.stream.shutdown().await {
        debug!(client = %envelope.client_address(), %err, "client socket shutdown failed");
    }
    outcome.map_err(Into::into)
}
