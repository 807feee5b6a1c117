//! Error types for floodgate.
//!
//! This module provides a unified error type for all floodgate operations.
//! The taxonomy matters more than the variants: admission rejections are not
//! errors at all (they are answered inline with a 429), a refused backend
//! connection is recovered inside the forwarder, and everything that remains
//! is fatal and stops the accept loop.

use thiserror::Error;

/// Result type alias for floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;

/// Unified error type for floodgate operations.
///
/// # Example
///
/// ```
/// use floodgate_core::error::{FloodgateError, Result};
///
/// fn validate_port(port: u16) -> Result<()> {
///     if port == 0 {
///         return Err(FloodgateError::Config("port must be greater than 0".into()));
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Error)]
pub enum FloodgateError {
    /// Configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Underlying socket failure. Fatal when it escapes a handler.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend refused the connection. Recovered inside the forwarder
    /// by synthesizing a failure response; never reaches the dispatcher.
    #[error("backend unavailable at {addr}")]
    BackendUnavailable {
        /// Address of the backend that refused the connection.
        addr: String,
    },

    /// A per-client drain worker could not be joined during teardown.
    #[error("drain worker for {client_ip} failed to shut down: {reason}")]
    WorkerShutdown {
        /// Client IP whose worker failed.
        client_ip: String,
        /// Join failure detail.
        reason: String,
    },
}

impl FloodgateError {
    /// Returns true if this error must terminate the accept loop.
    ///
    /// Recoverable conditions are handled where they occur; anything that
    /// still carries this flag when it reaches the dispatcher is a bug in
    /// the handler, so the dispatcher fails fast either way.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::BackendUnavailable { .. })
    }
}
