//! Relay loop
//!
//! Lifecycle:
//!
//! ```text
//! Initializing ──ok──► Running ──cancel / upstream failure──► ShuttingDown ──► Terminated
//!      │                                                                          ▲
//!      └──────────────────────────── failure ─────────────────────────────────────┘
//! ```
//!
//! While running, every cycle accepts at most one pending viewer, sleeps for
//! the cycle delay, then reads and broadcasts chunks until the tick budget is
//! spent. New viewers are therefore picked up at least once per
//! `cycle_delay + tick_budget` (plus one chunk of overshoot) without a second
//! task.

use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::directory::Directory;
use crate::error::{Error, Result};
use crate::stats::RelayStats;
use crate::stream::StreamDescriptor;
use crate::transcoder::Transcoder;
use crate::upstream::{self, Upstream};

use super::clients::ClientSet;
use super::config::RelayConfig;
use super::listener::Listener;

/// Relay lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Setting up the listener, transcoder and upstream connection
    Initializing,
    /// Relaying upstream chunks to viewers
    Running,
    /// Releasing resources
    ShuttingDown,
    /// Everything released
    Terminated,
}

/// Why a relay run ended without an initialization failure
#[derive(Debug)]
pub enum StopReason {
    /// The stop signal was received
    Cancelled,
    /// The upstream connection failed or reached end of stream
    UpstreamEnded(Error),
}

/// Outcome of one broadcast burst
#[derive(Debug, Clone, Copy, Default)]
pub struct Burst {
    /// Chunks read and broadcast
    pub chunks: u64,
    /// Viewers dropped during the burst
    pub dropped: usize,
    /// Time spent in the burst
    pub elapsed: Duration,
}

/// Read and broadcast chunks until `budget` has elapsed
///
/// The budget is checked after every chunk, so a burst overshoots it by at
/// most one chunk read. Each chunk goes to the viewers connected at the time
/// it was read.
pub async fn pump<R, W>(
    upstream: &mut Upstream<R>,
    clients: &mut ClientSet<W>,
    budget: Duration,
    cancel: &CancellationToken,
    stats: &mut RelayStats,
) -> Result<Burst>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let started = Instant::now();
    let mut burst = Burst::default();

    loop {
        let chunk = upstream.read_chunk(cancel).await?;

        let dropped = clients.broadcast_and_prune(&chunk);
        stats.record_chunk(chunk.len(), clients.len(), dropped);
        burst.chunks += 1;
        burst.dropped += dropped;

        tracing::trace!(len = chunk.len(), clients = clients.len(), "Chunk relayed");

        burst.elapsed = started.elapsed();
        if burst.elapsed > budget {
            return Ok(burst);
        }
    }
}

/// The live relay
///
/// Owns the listener, the transcoder, the upstream connection, the viewers and
/// the directory registration. Everything is released by [`Relay::shutdown`],
/// which is safe to call more than once.
pub struct Relay<D: Directory> {
    config: RelayConfig,
    descriptor: StreamDescriptor,
    directory: D,
    cancel: CancellationToken,
    state: RelayState,
    listener: Option<Listener>,
    transcoder: Option<Transcoder>,
    upstream: Option<Upstream>,
    clients: ClientSet,
    registered: bool,
    stats: RelayStats,
}

impl<D: Directory> Relay<D> {
    /// Create a relay; nothing is opened until [`run`](Self::run)
    pub fn new(config: RelayConfig, directory: D, cancel: CancellationToken) -> Self {
        let descriptor = config.descriptor();

        Self {
            config,
            descriptor,
            directory,
            cancel,
            state: RelayState::Initializing,
            listener: None,
            transcoder: None,
            upstream: None,
            clients: ClientSet::new(),
            registered: false,
            stats: RelayStats::new(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Descriptor announced to the directory
    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    /// Address viewers connect to, once listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(Listener::local_addr)
    }

    /// Number of connected viewers
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Counters for this run
    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Token that stops the relay when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Initialize, relay until stopped, then clean up
    ///
    /// Cancellation, whether during startup or while running, is a normal stop.
    /// An initialization failure is returned as an error after cleanup.
    pub async fn run(&mut self) -> Result<StopReason> {
        let outcome = match self.initialize().await {
            Ok(()) => Ok(self.serve().await),
            Err(Error::Cancelled) => {
                tracing::info!("Stopped before the stream was ready");
                Ok(StopReason::Cancelled)
            }
            Err(e) => {
                tracing::error!(error = %e, "Relay initialization failed");
                Err(e)
            }
        };

        self.shutdown().await;
        outcome
    }

    /// Open the listener, start the transcoder, connect to it and register
    pub async fn initialize(&mut self) -> Result<()> {
        if self.state != RelayState::Initializing {
            return Err(Error::Config(format!(
                "cannot initialize a relay in state {:?}",
                self.state
            )));
        }
        self.config.validate()?;

        tracing::info!("Setting up listen socket");
        let listener = Listener::bind(self.config.listen_addr(), self.config.listen_backlog)?
            .nodelay(self.config.tcp_nodelay);
        self.listener = Some(listener);

        tracing::info!("Starting and connecting to transcoder");
        let transcoder = self.transcoder.insert(Transcoder::from_config(&self.config)?);
        let stream = upstream::connect(
            self.config.transcoder_addr(),
            self.config.connect_backoff,
            &self.cancel,
            || transcoder.check_running(),
        )
        .await?;
        self.upstream = Some(Upstream::new(stream, self.config.chunk_size));

        self.directory.new_stream(&self.descriptor).await?;
        self.registered = true;

        self.state = RelayState::Running;
        self.stats = RelayStats::new();
        tracing::info!(stream = %self.descriptor, "Relay ready");
        Ok(())
    }

    /// Run the accept/broadcast cycle until stopped
    ///
    /// Expects a successful [`initialize`](Self::initialize); leaves the relay
    /// in `ShuttingDown` for [`shutdown`](Self::shutdown) to finish.
    pub async fn serve(&mut self) -> StopReason {
        loop {
            match self.cycle().await {
                Ok(()) => {}
                Err(Error::Cancelled) => {
                    tracing::info!("Stop requested");
                    self.state = RelayState::ShuttingDown;
                    return StopReason::Cancelled;
                }
                Err(e) if e.is_end_of_stream() => {
                    tracing::info!("Upstream finished");
                    self.state = RelayState::ShuttingDown;
                    return StopReason::UpstreamEnded(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Upstream read failed");
                    self.state = RelayState::ShuttingDown;
                    return StopReason::UpstreamEnded(e);
                }
            }
        }
    }

    async fn cycle(&mut self) -> Result<()> {
        self.accept_pending().await;

        tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(self.config.cycle_delay) => {}
        }

        let Some(upstream) = self.upstream.as_mut() else {
            return Err(Error::UpstreamClosed {
                received: 0,
                expected: self.config.chunk_size,
            });
        };

        let burst = pump(
            upstream,
            &mut self.clients,
            self.config.tick_budget,
            &self.cancel,
            &mut self.stats,
        )
        .await?;

        if burst.dropped > 0 {
            tracing::debug!(
                dropped = burst.dropped,
                clients = self.clients.len(),
                "Viewers dropped during burst"
            );
        }
        Ok(())
    }

    async fn accept_pending(&mut self) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };

        if let Some((stream, peer)) = listener.try_accept().await {
            let id = self.clients.add(stream, Some(peer));
            self.stats.clients_accepted += 1;
            tracing::info!(
                client = id,
                peer = %peer,
                clients = self.clients.len(),
                "Accepted new client"
            );
        }
    }

    /// Release every resource
    ///
    /// Each step is independent and only logs its failures. Resources are
    /// taken as they are released, so calling this again is a no-op.
    pub async fn shutdown(&mut self) {
        if self.state == RelayState::Terminated {
            return;
        }
        self.state = RelayState::ShuttingDown;

        let closed = self.clients.clear();
        if closed > 0 {
            tracing::info!(clients = closed, "Closed client connections");
        }

        if let Some(listener) = self.listener.take() {
            let addr = listener.local_addr();
            drop(listener);
            tracing::info!(addr = %addr, "Listen socket closed");
        }

        if let Some(upstream) = self.upstream.take() {
            upstream.shutdown().await;
            tracing::info!("Upstream connection closed");
        }

        if std::mem::take(&mut self.registered) {
            match self.directory.close_stream(&self.descriptor).await {
                Ok(()) => tracing::info!(stream = %self.descriptor, "Stream deregistered"),
                Err(e) => {
                    tracing::warn!(stream = %self.descriptor, error = %e, "Failed to deregister stream")
                }
            }
        }

        if let Some(transcoder) = self.transcoder.take() {
            transcoder.terminate(self.config.terminate_grace).await;
        }

        tracing::info!(
            chunks = self.stats.chunks_relayed,
            bytes = self.stats.bytes_relayed,
            bitrate = self.stats.bitrate(),
            clients_accepted = self.stats.clients_accepted,
            clients_dropped = self.stats.clients_dropped,
            "Relay terminated"
        );
        self.state = RelayState::Terminated;
    }
}
