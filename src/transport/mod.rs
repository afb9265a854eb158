//! # Transport Module
//!
//! Blocking HTTP delivery of records to the InfluxDB v2 write API.
//!
//! This module handles:
//! - Single-record POSTs (plain line protocol body)
//! - Batch POSTs (gzip body with `Content-Encoding: gzip`)
//! - Token authentication and org/bucket/precision query parameters
//! - Bounded connect and total timeouts
//!
//! Any response outside 2xx counts as a failure, so the caller spools the
//! data instead of treating a rejected write as delivered.
//!
//! [`HttpTransport`] wraps a blocking client. Create, use and drop it on
//! plain OS threads, never from inside an async task.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::Url;
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::config::{InfluxDbConfig, TransportConfig};

/// Longest response body kept in a status error
const MAX_ERROR_BODY: usize = 256;

/// Errors produced while delivering data
#[derive(Debug, Error)]
pub enum TransportError {
    /// The configured endpoint could not be turned into a write URL
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// Connect, timeout or I/O failure before a response arrived
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Delivery of records to the remote store
#[cfg_attr(test, automock)]
pub trait Transport: Send + Sync {
    /// POST one uncompressed record.
    fn send_line(&self, line: &str) -> Result<(), TransportError>;

    /// POST one gzip-compressed batch of newline-terminated records.
    fn send_batch(&self, gzip: &[u8]) -> Result<(), TransportError>;
}

/// InfluxDB v2 HTTP transport
pub struct HttpTransport {
    client: Client,
    write_url: Url,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("write_url", &self.write_url.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Build a transport for the configured endpoint
    ///
    /// # Arguments
    ///
    /// * `influx` - Endpoint URL, org, bucket and token
    /// * `timeouts` - Connect and total request timeouts
    ///
    /// # Returns
    ///
    /// * `Result<HttpTransport, TransportError>` - Ready transport
    ///
    /// # Errors
    ///
    /// Returns error if the URL does not parse, the token is not a valid
    /// header value, or the client cannot be built
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sensor_uplink::config::{InfluxDbConfig, TransportConfig};
    /// use sensor_uplink::transport::{HttpTransport, Transport};
    ///
    /// let influx = InfluxDbConfig {
    ///     url: "http://localhost:8086".to_string(),
    ///     org: "lab".to_string(),
    ///     bucket: "bench".to_string(),
    ///     token: "secret".to_string(),
    /// };
    /// let transport = HttpTransport::new(&influx, &TransportConfig::default())?;
    /// transport.send_line("measurements A0=1.000000 1700000000")?;
    /// # Ok::<(), sensor_uplink::transport::TransportError>(())
    /// ```
    pub fn new(influx: &InfluxDbConfig, timeouts: &TransportConfig) -> Result<Self, TransportError> {
        Self::with_timeouts(influx, timeouts.connect_timeout(), timeouts.timeout())
    }

    /// Build a transport with explicit timeouts
    pub fn with_timeouts(
        influx: &InfluxDbConfig,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let write_url = write_url(&influx.url, &influx.org, &influx.bucket)?;

        let mut auth = HeaderValue::from_str(&format!("Token {}", influx.token))
            .map_err(|e| TransportError::Client(format!("invalid token: {}", e)))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .user_agent(concat!("sensor-uplink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self { client, write_url })
    }

    /// Full write URL including query parameters
    pub fn write_url(&self) -> &str {
        self.write_url.as_str()
    }

    fn post(&self, body: Vec<u8>, gzip: bool) -> Result<(), TransportError> {
        let mut request = self.client.post(self.write_url.clone()).body(body);
        if gzip {
            request = request.header(CONTENT_ENCODING, "gzip");
        }

        let response = request.send()?;
        let status = response.status();

        if status.is_success() {
            debug!(status = status.as_u16(), gzip, "Write accepted");
            return Ok(());
        }

        let mut body = response.text().unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }

        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn send_line(&self, line: &str) -> Result<(), TransportError> {
        self.post(line.as_bytes().to_vec(), false)
    }

    fn send_batch(&self, gzip: &[u8]) -> Result<(), TransportError> {
        self.post(gzip.to_vec(), true)
    }
}

/// Build `{base}/api/v2/write?org=..&bucket=..&precision=s`.
fn write_url(base: &str, org: &str, bucket: &str) -> Result<Url, TransportError> {
    let endpoint = format!("{}/api/v2/write", base.trim_end_matches('/'));

    Url::parse_with_params(
        &endpoint,
        &[("org", org), ("bucket", bucket), ("precision", "s")],
    )
    .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", endpoint, e)))
}
