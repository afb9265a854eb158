//! # Logging Module
//!
//! Sets up the `tracing` subscriber.
//!
//! Output always goes to stderr. When a log directory is configured, a daily
//! rolling file is written as well through a non-blocking writer; the
//! returned guard must be kept alive until exit so buffered lines are
//! flushed.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// File name prefix for rolling log files
const LOG_FILE_PREFIX: &str = "sensor-uplink.log";

/// Build the filter: `RUST_LOG` wins, otherwise the configured level.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(level))
}

/// Parse configured directives, falling back to `info` if they are malformed.
fn level_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber
///
/// # Arguments
///
/// * `config` - Level and optional log directory
///
/// # Returns
///
/// * `Option<WorkerGuard>` - Guard for the file writer, if file logging is on
///
/// # Examples
///
/// ```no_run
/// use sensor_uplink::config::LoggingConfig;
/// use sensor_uplink::logging;
///
/// let _guard = logging::init(&LoggingConfig::default());
/// tracing::info!("ready");
/// ```
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(env_filter(&config.level))
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();

            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter(&config.level))
                .with(stderr_layer)
                .init();

            None
        }
    }
}
