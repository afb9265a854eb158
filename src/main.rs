//! # Sensor Uplink
//!
//! Samples ADC channels and GPS on a fixed interval and ships each sample set
//! to InfluxDB, spooling to disk whenever the server cannot be reached.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use sensor_uplink::config::Config;
use sensor_uplink::logging;
use sensor_uplink::sampling::{Collector, Publisher, SimulatedSampler};
use sensor_uplink::sender::{Sender, SenderOptions};
use sensor_uplink::spool::Spool;
use sensor_uplink::transport::HttpTransport;

/// Number of cycles between status log messages
const LOG_INTERVAL_CYCLES: u64 = 60;

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "sensor-uplink", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,
}

/// Main entry point for Sensor Uplink
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load and validate configuration
///    - Set up logging
///    - Open the spool, build the transport, start the sender threads
///
/// 2. **Main Loop**
///    - Collect one sample set per interval
///    - Publish it as a record to the sender
///    - Log status every 60 cycles
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Stop the sender (queued records are spooled)
///    - Log delivery counters
///
/// The HTTP client is blocking, so it is created and dropped outside the
/// async runtime, which only drives the interval and signal handling.
///
/// # Errors
///
/// Returns error if:
/// - The configuration cannot be loaded or is invalid
/// - The spool directory cannot be created
/// - The HTTP client or sender threads cannot be started
fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config.display()))?;

    let _log_guard = logging::init(&config.logging);
    info!("Sensor Uplink v{} starting...", env!("CARGO_PKG_VERSION"));
    debug!(?config, "Configuration loaded");

    let spool = Spool::with_batch_lines(&config.spool.path, config.spool.batch_lines)
        .context("failed to open spool")?;
    let pending = spool.pending_lines().unwrap_or(0);
    if pending > 0 {
        info!(pending, path = %spool.path().display(), "Spool holds records from a previous run");
    }

    let transport = HttpTransport::new(&config.influxdb, &config.transport)
        .context("failed to build HTTP transport")?;
    info!("Writing to {}", transport.write_url());

    let options = SenderOptions {
        replay_interval: config.spool.replay_interval(),
        ..SenderOptions::default()
    };
    let mut sender = Sender::start(Arc::new(transport), spool, options)
        .context("failed to start sender")?;

    let sampler = SimulatedSampler::new(config.channels.len());
    let mut collector = Collector::new(sampler, &config.channels, &config.sampling);
    let mut publisher = Publisher::new(&config.sampling);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .enable_io()
        .build()
        .context("failed to build runtime")?;

    let cycles = runtime.block_on(async {
        let mut ticker = interval(config.sampling.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Sampling every {} ms", config.sampling.interval_ms);
        info!("Press Ctrl+C to exit");

        let mut cycles: u64 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = collector.collect();
                    if summary.failed > 0 {
                        debug!(failed = summary.failed, "Some channels had no reading this cycle");
                    }

                    if let Err(e) = publisher.publish(collector.channels(), collector.last_fix(), &sender) {
                        warn!("Failed to publish sample: {}", e);
                        continue;
                    }

                    cycles += 1;

                    if cycles % LOG_INTERVAL_CYCLES == 0 {
                        let stats = sender.stats();
                        info!(
                            cycles,
                            sent = stats.sent,
                            spooled = stats.spooled,
                            replayed = stats.replayed,
                            queued = sender.queued(),
                            "Status"
                        );
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down...");
                    break;
                }
            }
        }

        cycles
    });

    drop(runtime);
    sender.shutdown();
    info!("Total samples published: {}", cycles);

    Ok(())
}
