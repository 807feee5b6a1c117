//! The accept loop and configuration hot-swap.
//!
//! The server is single-threaded for admission decisions: every accepted
//! connection is handed to the active algorithm on the accept task itself.
//! On the token bucket path this means forwarding blocks the accept loop
//! for one backend round trip per request; the leaky bucket path returns
//! as soon as the request is queued. Serializing the token bucket path is
//! a deliberate simplification inherited from the design, not an oversight.
//!
//! Configuration changes are applied between connections, never during
//! one: when the source reports a change, the current algorithm is torn
//! down, a fresh instance is built from the new snapshot and set up, and
//! only then is the just-accepted connection handled. Every connection is
//! therefore served by exactly one fully-set-up algorithm instance.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::ConfigSource;
use crate::error::Result;
use crate::limiter;
use crate::types::RequestEnvelope;

/// Lifecycle of the listening socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerState {
    /// Accepting and dispatching connections.
    Listening,
    /// Shutdown requested; no longer accepting, draining workers.
    Draining,
    /// Listener closed, all workers drained.
    Closed,
}

/// Signals the server to stop accepting and drain.
///
/// The core installs no OS signal handlers; whoever owns the process wires
/// one of these to its shutdown source.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Requests a graceful shutdown. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Owns the listening socket and dispatches accepted connections to the
/// active rate-limiting algorithm.
pub struct Server<S: ConfigSource> {
    listen_host: String,
    listen_port: u16,
    config_source: Arc<S>,
    state: ServerState,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<S: ConfigSource> Server<S> {
    /// Creates a server that will bind `listen_host:listen_port` when run.
    pub fn new(listen_host: impl Into<String>, listen_port: u16, config_source: Arc<S>) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            listen_host: listen_host.into(),
            listen_port,
            config_source,
            state: ServerState::Closed,
            shutdown_tx: Arc::new(tx),
            shutdown_rx: rx,
        }
    }

    /// Returns `host:port` the server listens on.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Returns a handle that stops the accept loop when triggered.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Runs the accept loop until shutdown or a fatal error.
    ///
    /// Either way the active algorithm is torn down (blocking until every
    /// per-client worker has exited) and the listener is closed before
    /// this returns. Recoverable conditions are answered inline by the
    /// algorithms; an error here is fatal by definition.
    pub async fn run(&mut self) -> Result<()> {
        let listener =
            TcpListener::bind((self.listen_host.as_str(), self.listen_port)).await?;
        info!(address = %self.listen_address(), "start listening");
        self.state = ServerState::Listening;

        let mut algorithm = limiter::build_algorithm(&self.config_source.current());
        algorithm.setup().await?;

        let mut shutdown_rx = self.shutdown_rx.clone();
        let loop_result = loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    debug!("got shutdown signal");
                    break Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(connection) => connection,
                        Err(err) => break Err(err.into()),
                    };

                    if self.config_source.is_changed() {
                        info!("configuration changed, swapping rate limit algorithm");
                        if let Err(err) = algorithm.teardown().await {
                            break Err(err);
                        }
                        algorithm = limiter::build_algorithm(&self.config_source.current());
                        if let Err(err) = algorithm.setup().await {
                            break Err(err);
                        }
                    }

                    let envelope = RequestEnvelope::new(stream, peer);
                    // The algorithm owns the envelope from here; every path
                    // through it closes the connection, so a fatal error
                    // only needs to stop the loop.
                    if let Err(err) = algorithm.handle(envelope).await {
                        break Err(err);
                    }
                }
            }
        };

        self.state = ServerState::Draining;
        debug!("draining rate limit algorithm");
        let teardown_result = algorithm.teardown().await;
        drop(listener);
        self.state = ServerState::Closed;
        info!("server socket has been closed");

        loop_result.and(teardown_result)
    }
}
