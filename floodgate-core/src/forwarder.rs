//! Single-shot request forwarding.
//!
//! One [`Forwarder`] invocation relays exactly one request/response pair:
//! read up to the buffer size from the client, write to the backend, read
//! up to the buffer size back, inject the rate-limit headers, relay to the
//! client. The backend connection is never reused across calls.
//!
//! Payloads larger than the buffer are truncated at the buffer boundary;
//! the relay performs a single read on each side. This is a documented
//! assumption of the wire behavior, not an accident.

use std::io::ErrorKind;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error};

use crate::error::{FloodgateError, Result};
use crate::headers;
use crate::types::{RateLimitQuota, RequestEnvelope};

/// Relays one request/response pair between a client and the fixed backend.
#[derive(Clone, Debug)]
pub struct Forwarder {
    backend_host: String,
    backend_port: u16,
    buf_size: usize,
}

impl Forwarder {
    /// Creates a forwarder for the given backend and socket buffer size.
    pub fn new(backend_host: impl Into<String>, backend_port: u16, buf_size: usize) -> Self {
        Self {
            backend_host: backend_host.into(),
            backend_port,
            buf_size,
        }
    }

    /// Returns `host:port` of the backend.
    pub fn backend_address(&self) -> String {
        format!("{}:{}", self.backend_host, self.backend_port)
    }

    /// Forwards the request held by `envelope` and relays the annotated
    /// response.
    ///
    /// A refused backend connection is answered with a synthesized 503
    /// carrying the same rate-limit headers. The client socket is shut
    /// down on every path, success or failure; only unexpected socket
    /// errors escape.
    pub async fn forward(&self, mut envelope: RequestEnvelope, quota: RateLimitQuota) -> Result<()> {
        let outcome = self.relay(&mut envelope, &quota).await;
        if let Err(err) = envelope.stream.shutdown().await {
            debug!(client = %envelope.client_address(), %err, "client socket shutdown failed");
        }
        outcome
    }

    async fn relay(&self, envelope: &mut RequestEnvelope, quota: &RateLimitQuota) -> Result<()> {
        let mut request = vec![0u8; self.buf_size];
        let request_len = envelope.stream.read(&mut request).await?;
        debug!(
            client = %envelope.client_address(),
            bytes = request_len,
            "read request from client"
        );

        let mut backend = match self.connect_backend().await {
            Ok(stream) => stream,
            Err(FloodgateError::BackendUnavailable { addr }) => {
                error!(
                    backend = %addr,
                    client = %envelope.client_address(),
                    "backend refused connection, sending failure response"
                );
                let failure = headers::backend_unavailable_response(quota, &addr);
                envelope.stream.write_all(&failure).await?;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        backend.write_all(&request[..request_len]).await?;
        let mut response = vec![0u8; self.buf_size];
        let response_len = backend.read(&mut response).await?;
        debug!(
            backend = %self.backend_address(),
            bytes = response_len,
            "read response from backend"
        );

        let annotated = headers::inject_rate_limit_headers(&response[..response_len], quota);
        envelope.stream.write_all(&annotated).await?;
        debug!(client = %envelope.client_address(), "relayed response to client");
        Ok(())
    }

    async fn connect_backend(&self) -> Result<TcpStream> {
        debug!(backend = %self.backend_address(), "connecting to backend");
        match TcpStream::connect((self.backend_host.as_str(), self.backend_port)).await {
            Ok(stream) => Ok(stream),
            Err(err) if err.kind() == ErrorKind::ConnectionRefused => {
                Err(FloodgateError::BackendUnavailable {
                    addr: self.backend_address(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}
