//! Core types shared between the dispatcher, the limiter algorithms, and
//! the forwarder.

use std::net::SocketAddr;

use tokio::net::TcpStream;

/// A single accepted client connection awaiting an admission decision.
///
/// The stream is exclusively owned by whichever component currently holds
/// the envelope: the dispatcher until it hands it to the algorithm, then the
/// algorithm (or its drain worker) until the response is written and the
/// socket is shut down.
#[derive(Debug)]
pub struct RequestEnvelope {
    /// The accepted client connection.
    pub stream: TcpStream,
    /// Client IP address, used as the rate-limiting key.
    pub client_ip: String,
    /// Client source port, kept for log context.
    pub client_port: u16,
}

impl RequestEnvelope {
    /// Wraps an accepted connection together with its peer address.
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            client_ip: peer.ip().to_string(),
            client_port: peer.port(),
        }
    }

    /// Returns `ip:port` for log messages.
    pub fn client_address(&self) -> String {
        format!("{}:{}", self.client_ip, self.client_port)
    }
}

/// The values carried into the `X-Ratelimit-*` response headers.
///
/// Both algorithms produce one of these per decision: the token bucket from
/// its remaining token count, the leaky bucket from its free queue slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitQuota {
    /// Requests the client may still issue before being limited.
    pub remaining: u64,
    /// Total quota (bucket capacity or queue size).
    pub limit: u64,
    /// Seconds after which the client should retry.
    pub retry_after_secs: u64,
}
