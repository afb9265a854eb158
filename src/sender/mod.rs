//! # Sender Module
//!
//! Routes every submitted record to either "sent" or "spooled".
//!
//! This module handles:
//! - Queueing records from the sampling loop without blocking on the network
//! - A drain thread sending one record per POST, spooling on failure
//! - A replay thread flushing the spool in compressed batches on an interval
//! - Graceful shutdown joining both threads
//!
//! ## Threads
//!
//! ```text
//! submit() ──► DeliveryQueue ──► drain thread ──► Transport::send_line
//!                                      │ failure
//!                                      ▼
//!                                    Spool ◄── replay thread ──► Transport::send_batch
//! ```
//!
//! Records still queued when shutdown begins are appended to the spool
//! without a transmission attempt; they go out with the next replay.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::line_protocol::Record;
use crate::queue::DeliveryQueue;
use crate::spool::{ReplayOutcome, Spool};
use crate::transport::Transport;

/// Seconds between spool replays
pub const DEFAULT_REPLAY_INTERVAL_S: u64 = 60;

/// Granularity of the replay thread's sleep
const REPLAY_TICK: Duration = Duration::from_secs(1);

/// Sender timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderOptions {
    /// Time between spool replays
    pub replay_interval: Duration,

    /// Sleep step of the replay thread; bounds how long shutdown waits for it
    pub tick: Duration,
}

impl Default for SenderOptions {
    fn default() -> Self {
        Self {
            replay_interval: Duration::from_secs(DEFAULT_REPLAY_INTERVAL_S),
            tick: REPLAY_TICK,
        }
    }
}

/// Point-in-time copy of the sender counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Records delivered by the drain thread
    pub sent: u64,

    /// Records appended to the spool
    pub spooled: u64,

    /// Records lost (queue allocation or spool write failure)
    pub dropped: u64,

    /// Spooled records delivered by replay
    pub replayed: u64,
}

#[derive(Debug, Default)]
struct SenderStats {
    sent: AtomicU64,
    spooled: AtomicU64,
    dropped: AtomicU64,
    replayed: AtomicU64,
}

impl SenderStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            spooled: self.spooled.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
        }
    }
}

/// State shared with the background threads
struct Shared {
    running: AtomicBool,
    queue: DeliveryQueue<Record>,
    spool: Spool,
    transport: Arc<dyn Transport>,
    stats: SenderStats,
}

impl Shared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn spool_record(&self, record: &Record) {
        match self.spool.append(record.as_str()) {
            Ok(()) => {
                self.stats.spooled.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!(path = %self.spool.path().display(), "Failed to spool record, dropping it: {}", e);
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn replay(&self) -> Result<ReplayOutcome> {
        let outcome = self.spool.replay(|gzip| match self.transport.send_batch(gzip) {
            Ok(()) => true,
            Err(e) => {
                warn!("Spool batch not delivered: {}", e);
                false
            }
        })?;

        self.stats
            .replayed
            .fetch_add(outcome.lines_sent as u64, Ordering::Relaxed);
        Ok(outcome)
    }
}

/// Sender orchestrator
///
/// Owns the delivery queue, the spool and both background threads.
/// Dropping the sender shuts it down.
pub struct Sender {
    shared: Arc<Shared>,
    drain: Option<JoinHandle<()>>,
    replay: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("running", &self.shared.is_running())
            .field("queued", &self.shared.queue.len())
            .field("spool", &self.shared.spool.path())
            .finish_non_exhaustive()
    }
}

impl Sender {
    /// Start the drain and replay threads
    ///
    /// # Arguments
    ///
    /// * `transport` - Delivery backend shared by both threads
    /// * `spool` - Offline spool; owned by the sender from now on
    /// * `options` - Replay interval and tick
    ///
    /// # Returns
    ///
    /// * `Result<Sender>` - Running sender
    ///
    /// # Errors
    ///
    /// Returns error if either thread cannot be spawned. A drain thread
    /// that was already started is stopped and joined first.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use sensor_uplink::config::Config;
    /// use sensor_uplink::line_protocol::Record;
    /// use sensor_uplink::sender::{Sender, SenderOptions};
    /// use sensor_uplink::spool::Spool;
    /// use sensor_uplink::transport::HttpTransport;
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let config = Config::load("config/default.toml")?;
    ///     let transport = HttpTransport::new(&config.influxdb, &config.transport)?;
    ///     let spool = Spool::open(&config.spool.path)?;
    ///
    ///     let mut sender = Sender::start(Arc::new(transport), spool, SenderOptions::default())?;
    ///     sender.submit(Record::parse("measurements A0=1.000000 1700000000")?);
    ///     sender.shutdown();
    ///     Ok(())
    /// }
    /// ```
    pub fn start(
        transport: Arc<dyn Transport>,
        spool: Spool,
        options: SenderOptions,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            queue: DeliveryQueue::new(),
            spool,
            transport,
            stats: SenderStats::default(),
        });

        let drain = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("uplink-drain".to_string())
                .spawn(move || drain_loop(&shared))?
        };

        let replay = {
            let thread_shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("uplink-replay".to_string())
                .spawn(move || replay_loop(&thread_shared, options))
        };

        let replay = match replay {
            Ok(handle) => handle,
            Err(e) => {
                shared.running.store(false, Ordering::Release);
                shared.queue.shutdown();
                if drain.join().is_err() {
                    error!("Drain thread panicked");
                }
                return Err(e.into());
            }
        };

        info!(
            spool = %shared.spool.path().display(),
            replay_interval_s = options.replay_interval.as_secs(),
            "Sender started"
        );

        Ok(Self {
            shared,
            drain: Some(drain),
            replay: Some(replay),
        })
    }

    /// Submit a record for delivery.
    ///
    /// Never blocks on the network. The record is moved into the queue; when
    /// the sender is not running it goes straight to the spool instead.
    pub fn submit(&self, record: Record) {
        if !self.shared.is_running() {
            warn!("Sender is not running, spooling record");
            self.shared.spool_record(&record);
            return;
        }

        if !self.shared.queue.enqueue(record) {
            self.shared.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Replay the spool immediately on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns error if the spool file cannot be read or rewritten
    pub fn replay_now(&self) -> Result<ReplayOutcome> {
        self.shared.replay()
    }

    /// True until [`shutdown`](Self::shutdown) is called
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Records waiting in the queue
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// The sender's spool
    pub fn spool(&self) -> &Spool {
        &self.shared.spool
    }

    /// Snapshot of the delivery counters
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Stop both threads and wait for them. Idempotent.
    ///
    /// Clears the running flag, shuts the queue down, then joins the drain
    /// and replay threads. Anything still queued is spooled.
    pub fn shutdown(&mut self) {
        if self.drain.is_none() && self.replay.is_none() {
            return;
        }

        info!("Stopping sender");
        self.shared.running.store(false, Ordering::Release);
        self.shared.queue.shutdown();

        for (name, handle) in [("drain", self.drain.take()), ("replay", self.replay.take())] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    error!("Sender {} thread panicked", name);
                }
            }
        }

        // Only reachable if the drain thread died early
        while let Some(record) = self.shared.queue.try_dequeue() {
            self.shared.spool_record(&record);
        }

        let stats = self.stats();
        info!(
            sent = stats.sent,
            spooled = stats.spooled,
            dropped = stats.dropped,
            replayed = stats.replayed,
            "Sender stopped"
        );
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn drain_loop(shared: &Shared) {
    debug!("Drain thread started");

    while let Some(record) = shared.queue.dequeue() {
        if !shared.is_running() {
            shared.spool_record(&record);
            continue;
        }

        match shared.transport.send_line(record.as_str()) {
            Ok(()) => {
                shared.stats.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("Failed to send record, spooling it: {}", e);
                shared.spool_record(&record);
            }
        }
    }

    debug!("Drain thread finished");
}

fn replay_loop(shared: &Shared, options: SenderOptions) {
    debug!("Replay thread started");
    let tick = options.tick.max(Duration::from_millis(1));

    while shared.is_running() {
        let mut waited = Duration::ZERO;
        while waited < options.replay_interval && shared.is_running() {
            let step = tick.min(options.replay_interval - waited);
            thread::sleep(step);
            waited += step;
        }

        if !shared.is_running() {
            break;
        }

        if let Err(e) = shared.replay() {
            error!("Spool replay failed: {}", e);
        }
    }

    debug!("Replay thread finished");
}
