//! Public handle for one reliable stream.
//!
//! A [`Connection`] owns a background worker task and the shared
//! [`Endpoint`] it drives:
//!
//! ```text
//!  Application                          worker task (one per connection)
//!      │ send(data)  ──lock──▶ ┌──────────────────┐ ◀──lock── tick() every
//!      │ recv(max)   ──lock──▶ │ Mutex<Endpoint>  │           tick_interval
//!      │     ▲                 └──────────────────┘               │
//!      │     └──────────── Notify (message ready) ◀───────────────┘
//! ```
//!
//! - [`Connection::send`] never blocks on the network: it fragments the data
//!   and queues it under the lock, so concurrent callers get contiguous,
//!   gap-free ids.
//! - [`Connection::recv`] waits on a [`Notify`] that the worker signals after
//!   a tick completes reassembly of at least one message.
//! - [`Connection::drain`] waits until everything sent so far has left the
//!   outbound queue and been acknowledged.
//! - [`Connection::close`] flips a `watch` flag the worker checks once per
//!   tick, then waits for the task to finish.  Dropping the connection
//!   signals the flag without waiting.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::{Config, ConfigError};
use crate::endpoint::{Endpoint, Stats};
use crate::socket::{DatagramChannel, Socket};

/// Errors surfaced by [`Connection`].
///
/// Only construction fails with `Io` or `Config`; once running, every
/// network fault is absorbed by the protocol.
#[derive(Error, Debug)]
pub enum ConnError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("connection closed")]
    Closed,
}

/// State shared between the application handle and the worker task.
#[derive(Debug)]
struct Shared {
    endpoint: Mutex<Endpoint>,
    /// Signalled whenever new messages become readable or the worker stops.
    readable: Notify,
    closed: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Endpoint> {
        self.endpoint.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A reliable, ordered message stream to one fixed peer.
///
/// Dropping a `Connection` only asks the worker to stop; the socket is
/// released whenever the task next runs.  Call [`Connection::close`] to
/// wait for that, and [`Connection::drain`] first if queued data must
/// still reach the peer.
#[derive(Debug)]
pub struct Connection {
    name: String,
    local_addr: Option<SocketAddr>,
    tick: Duration,
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
}

impl Connection {
    /// Bind `local_addr`, fix `remote_addr` as the peer and start the worker
    /// with the default [`Config`].
    ///
    /// Fails only if the address cannot be bound.
    pub async fn new(
        name: &str,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) -> Result<Self, ConnError> {
        Self::with_config(name, local_addr, remote_addr, Config::default()).await
    }

    /// Like [`Connection::new`] with explicit protocol settings.
    pub async fn with_config(
        name: &str,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        config: Config,
    ) -> Result<Self, ConnError> {
        config.validate()?;
        let socket = Socket::bind(local_addr, remote_addr).await?;
        let local = socket.local_addr;
        log::info!("[{name}] bound {local} ↔ {remote_addr}");

        let mut conn = Self::spawn(name, Arc::new(socket), config);
        conn.local_addr = Some(local);
        Ok(conn)
    }

    /// Run the protocol over an arbitrary [`DatagramChannel`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_channel<C>(name: &str, channel: C, config: Config) -> Result<Self, ConnError>
    where
        C: DatagramChannel + 'static,
    {
        config.validate()?;
        Ok(Self::spawn(name, Arc::new(channel), config))
    }

    fn spawn(name: &str, channel: Arc<dyn DatagramChannel>, config: Config) -> Self {
        let tick = config.tick_interval;
        let shared = Arc::new(Shared {
            endpoint: Mutex::new(Endpoint::new(name, config)),
            readable: Notify::new(),
            closed: AtomicBool::new(false),
        });
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(worker_loop(
            name.to_string(),
            shared.clone(),
            channel,
            tick,
            shutdown_rx,
        ));

        Self {
            name: name.to_string(),
            local_addr: None,
            tick,
            shared,
            shutdown,
            worker: Some(worker),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound socket address, when running over UDP.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Queue `data` for reliable delivery and return immediately.
    ///
    /// The result is `data.len()` plus one header per fragment: an
    /// accounting figure, not a delivery confirmation.  Returns 0 once the
    /// connection is closed.
    pub fn send(&self, data: &[u8]) -> usize {
        if self.shared.closed.load(Ordering::Acquire) {
            log::warn!("[{}] send on closed connection ignored", self.name);
            return 0;
        }
        self.shared.lock().send(data)
    }

    /// Wait for the oldest complete message and return up to `max_len`
    /// bytes of it.
    ///
    /// A longer message is not truncated away: the remainder is returned by
    /// the following calls.  `max_len == 0` returns an empty vector without
    /// consuming anything.  Fails with [`ConnError::Closed`] once the
    /// connection is closed and nothing is left to read.
    pub async fn recv(&self, max_len: usize) -> Result<Vec<u8>, ConnError> {
        if max_len == 0 {
            return Ok(Vec::new());
        }
        loop {
            let notified = self.shared.readable.notified();
            tokio::pin!(notified);
            // Register before checking so a wakeup between the check and the
            // await is not lost.
            notified.as_mut().enable();

            let ready = self.shared.lock().read(max_len);
            if let Some(data) = ready {
                return Ok(data);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                return Err(ConnError::Closed);
            }
            notified.await;
        }
    }

    /// Non-blocking variant of [`Connection::recv`].
    pub fn try_recv(&self, max_len: usize) -> Option<Vec<u8>> {
        self.shared.lock().read(max_len)
    }

    /// Snapshot of the protocol counters.
    pub fn stats(&self) -> Stats {
        self.shared.lock().stats()
    }

    /// Wait until the outbound queue is empty and the peer has acknowledged
    /// every data packet, or until `limit` elapses.
    ///
    /// Returns `true` when fully drained.
    pub async fn drain(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let stats = self.stats();
            if stats.queued == 0 && stats.history_len == 0 {
                return true;
            }
            if self.shared.closed.load(Ordering::Acquire) || tokio::time::Instant::now() >= deadline {
                log::debug!(
                    "[{}] drain gave up: queued={} unacked={}",
                    self.name,
                    stats.queued,
                    stats.history_len
                );
                return false;
            }
            tokio::time::sleep(self.tick).await;
        }
    }

    /// Stop the worker and release the channel.
    ///
    /// The worker notices within one tick.  Calling `close` twice is a no-op.
    pub async fn close(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                log::warn!("[{}] worker task ended abnormally: {e}", self.name);
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn worker_loop(
    name: String,
    shared: Arc<Shared>,
    channel: Arc<dyn DatagramChannel>,
    tick: Duration,
    shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    log::debug!("[{name}] worker started, tick={tick:?}");

    loop {
        interval.tick().await;
        if *shutdown.borrow() {
            break;
        }
        let completed = shared.lock().tick(channel.as_ref());
        if completed {
            shared.readable.notify_waiters();
        }
    }

    shared.closed.store(true, Ordering::Release);
    shared.readable.notify_waiters();
    log::debug!("[{name}] worker stopped");
}
