//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every value has a default, so an empty file is a complete configuration
//! apart from the InfluxDB credentials. Those may also come from the
//! `INFLUXDB_URL`, `INFLUXDB_ORG`, `INFLUXDB_BUCKET` and `INFLUXDB_TOKEN`
//! environment variables, which take precedence over the file.

use serde::de::Error;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, UplinkError};
use crate::line_protocol::{is_valid_field_key, is_valid_measurement_name, is_valid_tag_key};

/// Maximum number of configured channels
pub const MAX_CHANNELS: usize = 16;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub influxdb: InfluxDbConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub spool: SpoolConfig,

    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// InfluxDB write endpoint
#[derive(Deserialize, Clone, Default)]
pub struct InfluxDbConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub org: String,

    #[serde(default)]
    pub bucket: String,

    #[serde(default)]
    pub token: String,
}

impl fmt::Debug for InfluxDbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxDbConfig")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// HTTP timeouts
#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    #[serde(default = "default_connect_timeout_s")]
    pub connect_timeout_s: u64,

    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,
}

/// Offline spool
#[derive(Debug, Deserialize, Clone)]
pub struct SpoolConfig {
    #[serde(default = "default_spool_path")]
    pub path: PathBuf,

    #[serde(default = "default_batch_lines")]
    pub batch_lines: usize,

    #[serde(default = "default_replay_interval_s")]
    pub replay_interval_s: u64,
}

/// Sampling loop and record layout
#[derive(Debug, Deserialize, Clone)]
pub struct SamplingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_measurement")]
    pub measurement: String,

    #[serde(default = "default_source_tag")]
    pub source_tag: String,

    #[serde(default)]
    pub filter_enabled: bool,

    #[serde(default = "default_filter_alpha")]
    pub filter_alpha: f64,

    #[serde(default = "default_read_retries")]
    pub read_retries: u32,

    #[serde(default = "default_read_retry_delay_ms")]
    pub read_retry_delay_ms: u64,
}

/// One ADC channel
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    pub id: String,

    #[serde(default)]
    pub unit: String,

    #[serde(default = "default_slope")]
    pub slope: f64,

    #[serde(default)]
    pub offset: f64,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Log output
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<PathBuf>,
}

// Default value functions
fn default_connect_timeout_s() -> u64 { 10 }
fn default_timeout_s() -> u64 { 20 }

fn default_spool_path() -> PathBuf { PathBuf::from("logs/offline_log.txt") }
fn default_batch_lines() -> usize { crate::spool::DEFAULT_BATCH_LINES }
fn default_replay_interval_s() -> u64 { crate::sender::DEFAULT_REPLAY_INTERVAL_S }

fn default_interval_ms() -> u64 { 1000 }
fn default_measurement() -> String { "measurements".to_string() }
fn default_source_tag() -> String { "instrumentacao".to_string() }
fn default_filter_alpha() -> f64 { 0.1 }
fn default_read_retries() -> u32 { 3 }
fn default_read_retry_delay_ms() -> u64 { 1 }

fn default_slope() -> f64 { 1.0 }
fn default_enabled() -> bool { true }

fn default_log_level() -> String { "info".to_string() }

fn default_channels() -> Vec<ChannelConfig> {
    (0..4)
        .map(|i| ChannelConfig {
            id: format!("A{}", i),
            unit: "V".to_string(),
            slope: default_slope(),
            offset: 0.0,
            enabled: default_enabled(),
        })
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            influxdb: InfluxDbConfig::default(),
            transport: TransportConfig::default(),
            spool: SpoolConfig::default(),
            sampling: SamplingConfig::default(),
            channels: default_channels(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_s: default_connect_timeout_s(),
            timeout_s: default_timeout_s(),
        }
    }
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            path: default_spool_path(),
            batch_lines: default_batch_lines(),
            replay_interval_s: default_replay_interval_s(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            measurement: default_measurement(),
            source_tag: default_source_tag(),
            filter_enabled: false,
            filter_alpha: default_filter_alpha(),
            read_retries: default_read_retries(),
            read_retry_delay_ms: default_read_retry_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_s)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_s)
    }
}

impl SpoolConfig {
    pub fn replay_interval(&self) -> Duration {
        Duration::from_secs(self.replay_interval_s)
    }
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn read_retry_delay(&self) -> Duration {
        Duration::from_millis(self.read_retry_delay_ms)
    }
}

fn invalid(msg: impl fmt::Display) -> UplinkError {
    UplinkError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Environment overrides are applied before validation.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sensor_uplink::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override InfluxDB settings from a variable lookup.
    ///
    /// Unset and empty variables leave the file value in place.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets = [
            ("INFLUXDB_URL", &mut self.influxdb.url),
            ("INFLUXDB_ORG", &mut self.influxdb.org),
            ("INFLUXDB_BUCKET", &mut self.influxdb.bucket),
            ("INFLUXDB_TOKEN", &mut self.influxdb.token),
        ];

        for (name, target) in targets {
            if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
                *target = value;
            }
        }
    }

    /// Validate configuration values
    ///
    /// # Returns
    ///
    /// * `Result<()>` - Ok if valid, Err if invalid
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is missing or out of range
    pub fn validate(&self) -> Result<()> {
        // InfluxDB endpoint
        for (name, value) in [
            ("influxdb.url", &self.influxdb.url),
            ("influxdb.org", &self.influxdb.org),
            ("influxdb.bucket", &self.influxdb.bucket),
            ("influxdb.token", &self.influxdb.token),
        ] {
            if value.is_empty() {
                return Err(invalid(format!("{} cannot be empty", name)));
            }
        }

        if !self.influxdb.url.starts_with("http://") && !self.influxdb.url.starts_with("https://") {
            return Err(invalid("influxdb.url must start with http:// or https://"));
        }

        // Timeouts
        if self.transport.connect_timeout_s == 0 || self.transport.connect_timeout_s > 60 {
            return Err(invalid("connect_timeout_s must be between 1 and 60"));
        }

        if self.transport.timeout_s == 0 || self.transport.timeout_s > 300 {
            return Err(invalid("timeout_s must be between 1 and 300"));
        }

        if self.transport.timeout_s < self.transport.connect_timeout_s {
            return Err(invalid("timeout_s must not be less than connect_timeout_s"));
        }

        // Spool
        if self.spool.path.as_os_str().is_empty() {
            return Err(invalid("spool path cannot be empty"));
        }

        if self.spool.batch_lines == 0 || self.spool.batch_lines > 100_000 {
            return Err(invalid("batch_lines must be between 1 and 100000"));
        }

        if self.spool.replay_interval_s == 0 || self.spool.replay_interval_s > 86_400 {
            return Err(invalid("replay_interval_s must be between 1 and 86400"));
        }

        // Sampling
        if self.sampling.interval_ms < 10 || self.sampling.interval_ms > 3_600_000 {
            return Err(invalid("interval_ms must be between 10 and 3600000"));
        }

        if !is_valid_measurement_name(&self.sampling.measurement) {
            return Err(invalid(format!(
                "measurement '{}' is not a valid measurement name",
                self.sampling.measurement
            )));
        }

        // Tag values are written unescaped
        if self.sampling.source_tag.is_empty()
            || !is_valid_tag_key(&self.sampling.source_tag)
        {
            return Err(invalid("source_tag must be non-empty and contain only letters, digits and '_'"));
        }

        if !(self.sampling.filter_alpha > 0.0 && self.sampling.filter_alpha <= 1.0) {
            return Err(invalid("filter_alpha must be in (0.0, 1.0]"));
        }

        if self.sampling.read_retries > 10 {
            return Err(invalid("read_retries must be at most 10"));
        }

        if self.sampling.read_retry_delay_ms > 1000 {
            return Err(invalid("read_retry_delay_ms must be at most 1000"));
        }

        // Channels
        if self.channels.len() > MAX_CHANNELS {
            return Err(invalid(format!("at most {} channels are supported", MAX_CHANNELS)));
        }

        if !self.channels.iter().any(|c| c.enabled) {
            return Err(invalid("at least one channel must be enabled"));
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if !is_valid_field_key(&channel.id) {
                return Err(invalid(format!("channel id '{}' is not a valid field key", channel.id)));
            }

            if !seen.insert(channel.id.as_str()) {
                return Err(invalid(format!("duplicate channel id '{}'", channel.id)));
            }

            if !channel.slope.is_finite() || !channel.offset.is_finite() {
                return Err(invalid(format!(
                    "channel '{}' slope and offset must be finite",
                    channel.id
                )));
            }
        }

        // Logging
        if self.logging.level.trim().is_empty() {
            return Err(invalid("logging level cannot be empty"));
        }

        Ok(())
    }
}
