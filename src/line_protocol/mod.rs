//! # Line Protocol Module
//!
//! Implementation of the InfluxDB line protocol used on the wire and in the
//! offline spool.
//!
//! This module handles:
//! - Building validated records (measurement, tags, typed fields, timestamp)
//! - Escaping string field values
//! - Parsing records back into their parts
//!
//! ## Wire Format
//!
//! ```text
//! measurement[,tag=value]* field=value[,field=value]* timestamp
//! ```
//!
//! Doubles use six decimals (`v=1.500000`), integers carry an `i` suffix
//! (`n=42i`), strings are quoted with `"` and `\` escaped, booleans are
//! `true`/`false`. Timestamps are seconds since the Unix epoch.

pub mod builder;
pub mod decoder;
pub mod field;

pub use builder::{LineProtocolBuilder, Record};
pub use field::FieldValue;

use thiserror::Error;

/// Default builder buffer capacity in bytes
pub const DEFAULT_CAPACITY: usize = 1024;

/// Smallest buffer capacity a builder will start with
pub const MIN_CAPACITY: usize = 64;

/// Hard cap on the size of a single record (1 MiB)
pub const MAX_RECORD_SIZE: usize = 1024 * 1024;

/// Errors produced while building or parsing a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LineProtocolError {
    /// A parameter was out of range (e.g. a non-finite double)
    #[error("Invalid parameter")]
    InvalidParam,

    /// The record would exceed the maximum record size
    #[error("Buffer full")]
    BufferFull,

    /// The operation is not allowed in the builder's current state
    #[error("Invalid state")]
    InvalidState,

    /// Memory for the record could not be reserved
    #[error("Memory allocation failed")]
    MemoryAlloc,

    /// The measurement name failed validation
    #[error("Invalid measurement name")]
    InvalidMeasurement,

    /// A tag key failed validation
    #[error("Invalid tag key")]
    InvalidTagKey,

    /// A field key failed validation
    #[error("Invalid field key")]
    InvalidFieldKey,
}

/// Check a measurement name.
///
/// Names are non-empty, do not start with `_`, and contain only ASCII
/// alphanumerics, `_`, `-` and `.`.
///
/// # Examples
///
/// ```
/// use sensor_uplink::line_protocol::is_valid_measurement_name;
///
/// assert!(is_valid_measurement_name("power.bus-1"));
/// assert!(!is_valid_measurement_name("_internal"));
/// assert!(!is_valid_measurement_name("has space"));
/// ```
pub fn is_valid_measurement_name(name: &str) -> bool {
    if name.is_empty() || name.starts_with('_') {
        return false;
    }

    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Check a tag key: non-empty, ASCII alphanumerics and `_` only.
pub fn is_valid_tag_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Check a field key. Same rules as tag keys.
pub fn is_valid_field_key(key: &str) -> bool {
    is_valid_tag_key(key)
}

/// Current wall-clock time in whole seconds since the Unix epoch.
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
