//! Per-IP bounded queue drained by a background worker.
//!
//! Every client IP gets its own bounded queue and exactly one drain worker.
//! Admission is asynchronous: a successful enqueue is the decision, and the
//! response reaches the client whenever the worker forwards the request.
//! A full queue rejects immediately with a 429.
//!
//! Workers are cheap but not free, so an idle worker retires itself after
//! observing an empty queue for a configured number of consecutive drain
//! cycles. The dispatcher replaces a retired pair wholesale on the next
//! request from that IP; residual queue contents of the old pair are
//! discarded, which is safe because a worker only retires once its queue
//! has stayed empty.
//!
//! Within one IP the queue preserves FIFO order end to end. Workers of
//! different IPs are fully independent and interleave freely.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::LeakyBucketConfig;
use crate::error::{FloodgateError, Result};
use crate::forwarder::Forwarder;
use crate::limiter::{RateLimitAlgorithm, send_rejection};
use crate::types::{RateLimitQuota, RequestEnvelope};

/// Leaky bucket tuning, in the units the drain loop works in.
#[derive(Clone, Copy, Debug)]
pub struct LeakyBucketSettings {
    /// Time between drain cycles.
    pub period: Duration,
    /// Requests forwarded per drain cycle.
    pub drain_per_period: usize,
    /// Bounded queue capacity per client IP.
    pub queue_size: usize,
    /// Consecutive empty drain cycles before a worker retires.
    pub idle_cycles: u32,
}

impl From<&LeakyBucketConfig> for LeakyBucketSettings {
    fn from(config: &LeakyBucketConfig) -> Self {
        Self {
            period: config.period(),
            drain_per_period: config.drain_per_period,
            queue_size: config.queue_size,
            idle_cycles: config.idle_cycles,
        }
    }
}

impl LeakyBucketSettings {
    fn quota(&self, remaining: u64) -> RateLimitQuota {
        RateLimitQuota {
            remaining,
            limit: self.queue_size as u64,
            retry_after_secs: self.period.as_secs(),
        }
    }
}

/// Dispatcher-side handle to one client's queue and drain worker.
///
/// `stopped` has a single writer, the worker itself; the dispatcher only
/// reads it to decide whether the pair must be replaced. `stop` is flipped
/// once by teardown and polled by the worker each cycle.
struct ClientWorker {
    queue: mpsc::Sender<RequestEnvelope>,
    stopped: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Asynchronous per-IP admission with rate-smoothed forwarding.
pub struct LeakyBucketLimiter {
    settings: LeakyBucketSettings,
    forwarder: Arc<Forwarder>,
    workers: HashMap<String, ClientWorker>,
}

impl LeakyBucketLimiter {
    /// Creates a limiter with no client entries; pairs are created lazily
    /// on the first request from each IP.
    pub fn new(settings: LeakyBucketSettings, forwarder: Forwarder) -> Self {
        Self {
            settings,
            forwarder: Arc::new(forwarder),
            workers: HashMap::new(),
        }
    }

    /// Returns the entry for `client_ip`, creating or replacing the pair
    /// when absent or retired.
    fn live_worker(&mut self, client_ip: &str) -> &mut ClientWorker {
        match self.workers.entry(client_ip.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().stopped.load(Ordering::SeqCst) {
                    debug!(client_ip, "previous worker retired, replacing queue and worker");
                    entry.insert(spawn_worker(
                        self.settings,
                        Arc::clone(&self.forwarder),
                        client_ip,
                    ));
                }
                entry.into_mut()
            }
            Entry::Vacant(entry) => {
                debug!(client_ip, "creating queue and drain worker");
                entry.insert(spawn_worker(
                    self.settings,
                    Arc::clone(&self.forwarder),
                    client_ip,
                ))
            }
        }
    }
}

#[async_trait]
impl RateLimitAlgorithm for LeakyBucketLimiter {
    async fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    async fn handle(&mut self, envelope: RequestEnvelope) -> Result<()> {
        debug!(client = %envelope.client_address(), "handling request");
        let settings = self.settings;
        let client_ip = envelope.client_ip.clone();

        let worker = self.live_worker(&client_ip);
        let envelope = match worker.queue.try_send(envelope) {
            Ok(()) => {
                let queued = settings.queue_size - worker.queue.capacity();
                info!(
                    client_ip = %client_ip,
                    queued,
                    queue_size = settings.queue_size,
                    "request added to queue"
                );
                return Ok(());
            }
            Err(TrySendError::Full(envelope)) => {
                let remaining = worker.queue.capacity() as u64;
                info!(
                    client = %envelope.client_address(),
                    "request queue is full, rejecting request"
                );
                return send_rejection(envelope, settings.quota(remaining)).await;
            }
            // The worker retired between the stopped check and the send.
            // Rebuild the pair once and retry; the fresh queue cannot be
            // full unless requests raced in ahead of us.
            Err(TrySendError::Closed(envelope)) => envelope,
        };

        debug!(client_ip = %client_ip, "worker retired mid-enqueue, replacing pair");
        let worker = self.live_worker(&client_ip);
        match worker.queue.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(envelope)) | Err(TrySendError::Closed(envelope)) => {
                send_rejection(envelope, settings.quota(0)).await
            }
        }
    }

    async fn teardown(&mut self) -> Result<()> {
        let total = self.workers.len();
        for (index, (client_ip, worker)) in self.workers.drain().enumerate() {
            debug!(
                client_ip = %client_ip,
                index = index + 1,
                total,
                "waiting for drain worker to exit"
            );
            worker.stop.store(true, Ordering::SeqCst);
            if let Err(err) = worker.task.await {
                return Err(FloodgateError::WorkerShutdown {
                    client_ip,
                    reason: err.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Drop for LeakyBucketLimiter {
    fn drop(&mut self) {
        // Teardown is the orderly path; this only keeps workers from
        // sleeping forever if the limiter is dropped without it.
        for worker in self.workers.values() {
            worker.stop.store(true, Ordering::SeqCst);
        }
    }
}

fn spawn_worker(
    settings: LeakyBucketSettings,
    forwarder: Arc<Forwarder>,
    client_ip: &str,
) -> ClientWorker {
    let (queue, inbox) = mpsc::channel(settings.queue_size);
    let stopped = Arc::new(AtomicBool::new(false));
    let stop = Arc::new(AtomicBool::new(false));
    let worker = DrainWorker {
        client_ip: client_ip.to_string(),
        inbox,
        occupancy: queue.clone(),
        settings,
        forwarder,
        stop: Arc::clone(&stop),
        stopped: Arc::clone(&stopped),
    };
    ClientWorker {
        queue,
        stopped,
        stop,
        task: tokio::spawn(worker.run()),
    }
}

/// The background task draining one client's queue.
struct DrainWorker {
    client_ip: String,
    inbox: mpsc::Receiver<RequestEnvelope>,
    /// Sender clone kept only to observe queue occupancy.
    occupancy: mpsc::Sender<RequestEnvelope>,
    settings: LeakyBucketSettings,
    forwarder: Arc<Forwarder>,
    stop: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl DrainWorker {
    async fn run(mut self) {
        let mut idle_cycles = 0u32;
        loop {
            if self.stop.load(Ordering::SeqCst) {
                debug!(client_ip = %self.client_ip, "drain worker stop requested");
                break;
            }
            let queued = self.settings.queue_size - self.occupancy.capacity();
            let drain = self.settings.drain_per_period.min(queued);
            if drain == 0 {
                idle_cycles += 1;
                if idle_cycles >= self.settings.idle_cycles {
                    debug!(
                        client_ip = %self.client_ip,
                        cycles = idle_cycles,
                        "queue stayed empty, retiring worker"
                    );
                    break;
                }
            } else {
                idle_cycles = 0;
                info!(
                    client_ip = %self.client_ip,
                    draining = drain,
                    queued,
                    queue_size = self.settings.queue_size,
                    "processing queued requests"
                );
                for slot in 1..=drain {
                    let Ok(envelope) = self.inbox.try_recv() else {
                        break;
                    };
                    info!(
                        client = %envelope.client_address(),
                        slot,
                        of = drain,
                        "forwarding queued request"
                    );
                    let quota = self.current_quota();
                    if let Err(err) = self.forwarder.forward(envelope, quota).await {
                        // The connection is already closed by the forwarder;
                        // a worker failure must not take the server down.
                        error!(
                            client_ip = %self.client_ip,
                            %err,
                            "failed to forward queued request"
                        );
                    }
                }
            }
            tokio::time::sleep(self.settings.period).await;
        }
        self.stopped.store(true, Ordering::SeqCst);
        debug!(client_ip = %self.client_ip, "drain worker terminated");
    }

    fn current_quota(&self) -> RateLimitQuota {
        self.settings.quota(self.occupancy.capacity() as u64)
    }
}
