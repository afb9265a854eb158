//! # Error Types
//!
//! Custom error types for Sensor Uplink using `thiserror`.

use thiserror::Error;

use crate::line_protocol::LineProtocolError;
use crate::sampling::sampler::SamplerError;
use crate::transport::TransportError;

/// Main error type for Sensor Uplink
#[derive(Debug, Error)]
pub enum UplinkError {
    /// Record building or parsing errors
    #[error("Line protocol error: {0}")]
    LineProtocol(#[from] LineProtocolError),

    /// Transmission errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Hardware sampler errors
    #[error("Sampler error: {0}")]
    Sampler(#[from] SamplerError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Sensor Uplink
pub type Result<T> = std::result::Result<T, UplinkError>;
