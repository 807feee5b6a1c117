//! Shared helpers for unit tests: an in-memory config source, a disposable
//! single-buffer backend, and socket-pair plumbing. Only compiled for tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::config::{Config, ConfigSource};
use crate::types::RequestEnvelope;

/// In-memory [`ConfigSource`] whose snapshot is replaced by hand.
pub struct StaticConfigSource {
    current: Mutex<Arc<Config>>,
    changed: AtomicBool,
}

impl StaticConfigSource {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(Arc::new(config)),
            changed: AtomicBool::new(false),
        })
    }

    /// Installs a new snapshot and raises the changed flag.
    pub fn replace(&self, config: Config) {
        *self.current.lock().unwrap() = Arc::new(config);
        self.changed.store(true, Ordering::SeqCst);
    }
}

impl ConfigSource for StaticConfigSource {
    fn current(&self) -> Arc<Config> {
        self.changed.store(false, Ordering::SeqCst);
        self.current.lock().unwrap().clone()
    }

    fn is_changed(&self) -> bool {
        self.changed.load(Ordering::SeqCst)
    }
}

/// A single-buffer HTTP backend that records every request it receives and
/// answers each with the same small 200 response.
pub struct TestBackend {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl TestBackend {
    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for TestBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts a backend on an ephemeral loopback port.
pub async fn spawn_backend() -> TestBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);

    let task = tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            // Requests are recorded before the response is written so
            // arrival order matches forwarding order.
            let mut buf = vec![0u8; 4096];
            let n = stream.read(&mut buf).await.unwrap_or(0);
            log.lock()
                .unwrap()
                .push(String::from_utf8_lossy(&buf[..n]).into_owned());

            let body = "hello from backend";
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    TestBackend {
        addr,
        requests,
        task,
    }
}

/// Returns a connected socket pair: (client side, proxy side).
pub async fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (client.unwrap(), accepted.unwrap().0)
}

/// Builds an envelope for a fabricated client IP over a real socket pair.
/// Returns the client side alongside it.
pub async fn envelope_for(client_ip: &str) -> (TcpStream, RequestEnvelope) {
    let (client, proxy_side) = socket_pair().await;
    let envelope = RequestEnvelope {
        stream: proxy_side,
        client_ip: client_ip.to_string(),
        client_port: 40000,
    };
    (client, envelope)
}

/// Reads until EOF (bounded by a generous timeout) and returns the bytes
/// as lossy UTF-8.
pub async fn read_response(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf)).await;
    String::from_utf8_lossy(&buf).into_owned()
}

/// An address on which connections will be refused: the port was bound and
/// released, so nothing is listening there.
pub async fn refused_backend_addr() -> (String, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    ("127.0.0.1".to_string(), port)
}

/// Polls `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
