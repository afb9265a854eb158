//! # Record Builder
//!
//! Builds one validated line protocol record per call sequence.
//!
//! The builder moves through these states:
//!
//! ```text
//! EMPTY -> MEASUREMENT -> TAGS* -> FIELDS+ -> TIMESTAMP? -> FINALIZED
//! ```
//!
//! Malformed input is rejected before anything is written, so a failed call
//! never leaves a partial token in the buffer.
//!
//! ## Usage
//!
//! ```
//! use sensor_uplink::line_protocol::LineProtocolBuilder;
//!
//! let mut builder = LineProtocolBuilder::new();
//! builder.set_measurement("power")?;
//! builder.add_tag("board", "0x48")?;
//! builder.add_field_double("volts", 12.5)?;
//! builder.add_field_integer("samples", 4)?;
//! builder.set_timestamp(1_700_000_000)?;
//!
//! let record = builder.copy()?;
//! assert_eq!(record.as_str(), "power,board=0x48 volts=12.500000,samples=4i 1700000000");
//! # Ok::<(), sensor_uplink::line_protocol::LineProtocolError>(())
//! ```

use std::fmt;

use super::decoder::parse_line;
use super::field::{is_line_break, FieldValue};
use super::{
    current_timestamp, is_valid_field_key, is_valid_measurement_name, is_valid_tag_key,
    LineProtocolError, DEFAULT_CAPACITY, MAX_RECORD_SIZE, MIN_CAPACITY,
};

type Result<T> = std::result::Result<T, LineProtocolError>;

/// An immutable, fully formed line protocol record (without trailing newline).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record(String);

impl Record {
    /// Validate an externally produced line and wrap it as a record.
    ///
    /// A single trailing newline is stripped.
    ///
    /// # Errors
    ///
    /// `InvalidParam` if a line break remains inside the line, otherwise the
    /// first validation error found by the line parser.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.contains(is_line_break) {
            return Err(LineProtocolError::InvalidParam);
        }
        parse_line(line)?;
        Ok(Self(line.to_string()))
    }

    /// Borrow the record text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the record in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Records produced by the builder are never empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the record and return its text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Record {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Record> for String {
    fn from(record: Record) -> Self {
        record.0
    }
}

/// Accumulates one record at a time.
///
/// The buffer starts at [`DEFAULT_CAPACITY`] bytes (or a caller supplied
/// capacity of at least [`MIN_CAPACITY`]), doubles when an append would
/// overflow, and never grows past [`MAX_RECORD_SIZE`].
#[derive(Debug, Clone)]
pub struct LineProtocolBuilder {
    buffer: String,
    capacity: usize,
    has_measurement: bool,
    has_fields: bool,
    has_timestamp: bool,
    finalized: bool,
}

impl Default for LineProtocolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LineProtocolBuilder {
    /// Creates a builder with the default 1 KiB buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::with_capacity(DEFAULT_CAPACITY),
            capacity: DEFAULT_CAPACITY,
            has_measurement: false,
            has_fields: false,
            has_timestamp: false,
            finalized: false,
        }
    }

    /// Creates a builder with a custom initial capacity.
    ///
    /// Capacities below [`MIN_CAPACITY`] are raised to it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParam` if `capacity` exceeds [`MAX_RECORD_SIZE`].
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity > MAX_RECORD_SIZE {
            return Err(LineProtocolError::InvalidParam);
        }
        let capacity = capacity.max(MIN_CAPACITY);

        Ok(Self {
            buffer: String::with_capacity(capacity),
            capacity,
            has_measurement: false,
            has_fields: false,
            has_timestamp: false,
            finalized: false,
        })
    }

    /// Clears all content and state, keeping the allocated buffer.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.has_measurement = false;
        self.has_fields = false;
        self.has_timestamp = false;
        self.finalized = false;
    }

    /// Starts a new record with the given measurement name.
    ///
    /// Any tags or fields from a previous, unfinished record are discarded.
    ///
    /// # Errors
    ///
    /// - `InvalidState` once the builder is finalized (call [`reset`](Self::reset))
    /// - `InvalidMeasurement` if the name fails validation
    pub fn set_measurement(&mut self, name: &str) -> Result<()> {
        if self.finalized {
            return Err(LineProtocolError::InvalidState);
        }
        if !is_valid_measurement_name(name) {
            return Err(LineProtocolError::InvalidMeasurement);
        }

        self.reset();
        self.append(name)?;
        self.has_measurement = true;
        Ok(())
    }

    /// Appends a tag.
    ///
    /// Tags must follow the measurement and precede every field. The value is
    /// written verbatim; escaping it is the caller's responsibility.
    ///
    /// # Errors
    ///
    /// - `InvalidState` without a measurement, after a field, or once finalized
    /// - `InvalidTagKey` if the key fails validation
    pub fn add_tag(&mut self, key: &str, value: &str) -> Result<()> {
        if self.finalized || !self.has_measurement || self.has_fields {
            return Err(LineProtocolError::InvalidState);
        }
        if !is_valid_tag_key(key) {
            return Err(LineProtocolError::InvalidTagKey);
        }

        self.append(&format!(",{}={}", key, value))
    }

    /// Appends a typed field.
    ///
    /// # Errors
    ///
    /// - `InvalidState` without a measurement, after the timestamp, or once finalized
    /// - `InvalidFieldKey` if the key fails validation
    /// - `InvalidParam` for NaN or infinite doubles, or strings with `\n` / `\r`
    /// - `BufferFull` if the record would exceed [`MAX_RECORD_SIZE`]
    pub fn add_field(&mut self, key: &str, value: &FieldValue) -> Result<()> {
        if self.finalized || !self.has_measurement || self.has_timestamp {
            return Err(LineProtocolError::InvalidState);
        }
        if !is_valid_field_key(key) {
            return Err(LineProtocolError::InvalidFieldKey);
        }
        if !value.is_writable() {
            return Err(LineProtocolError::InvalidParam);
        }

        let separator = if self.has_fields { ',' } else { ' ' };
        self.append(&format!("{}{}={}", separator, key, value))?;
        self.has_fields = true;
        Ok(())
    }

    /// Appends a double field (`key=1.500000`).
    pub fn add_field_double(&mut self, key: &str, value: f64) -> Result<()> {
        self.add_field(key, &FieldValue::Double(value))
    }

    /// Appends an integer field (`key=42i`).
    pub fn add_field_integer(&mut self, key: &str, value: i64) -> Result<()> {
        self.add_field(key, &FieldValue::Integer(value))
    }

    /// Appends a string field (`key="escaped"`).
    pub fn add_field_string(&mut self, key: &str, value: &str) -> Result<()> {
        self.add_field(key, &FieldValue::String(value.to_string()))
    }

    /// Appends a boolean field (`key=true`).
    pub fn add_field_boolean(&mut self, key: &str, value: bool) -> Result<()> {
        self.add_field(key, &FieldValue::Boolean(value))
    }

    /// Sets the record timestamp in seconds since the Unix epoch.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless a measurement and at least one field exist, if a
    /// timestamp was already set, or once finalized.
    pub fn set_timestamp(&mut self, timestamp: i64) -> Result<()> {
        if self.finalized || !self.has_measurement || !self.has_fields || self.has_timestamp {
            return Err(LineProtocolError::InvalidState);
        }

        self.append(&format!(" {}", timestamp))?;
        self.has_timestamp = true;
        Ok(())
    }

    /// Sets the timestamp to the current wall-clock second.
    pub fn set_timestamp_now(&mut self) -> Result<()> {
        self.set_timestamp(current_timestamp())
    }

    /// Checks that the builder holds enough to form a record.
    ///
    /// # Errors
    ///
    /// `InvalidMeasurement` without a measurement, `InvalidState` without fields.
    pub fn validate(&self) -> Result<()> {
        if !self.has_measurement {
            return Err(LineProtocolError::InvalidMeasurement);
        }
        if !self.has_fields {
            return Err(LineProtocolError::InvalidState);
        }
        Ok(())
    }

    /// Finalizes the record and returns a view of it.
    ///
    /// Injects the current time if no timestamp was set. After this call the
    /// builder rejects every mutation until [`reset`](Self::reset) or a new
    /// builder is used. Calling it again returns the same record.
    pub fn finalize(&mut self) -> Result<&str> {
        if !self.finalized {
            self.validate()?;
            if !self.has_timestamp {
                self.set_timestamp_now()?;
            }
            self.finalized = true;
        }

        Ok(&self.buffer)
    }

    /// Finalizes the record and returns an owned copy.
    pub fn copy(&mut self) -> Result<Record> {
        self.finalize().map(|line| Record(line.to_string()))
    }

    /// Finalizes the record and hands over the buffer without copying.
    pub fn build(mut self) -> Result<Record> {
        self.finalize()?;
        Ok(Record(self.buffer))
    }

    /// Current record length in bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Logical buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once the record has been finalized.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn append(&mut self, text: &str) -> Result<()> {
        self.ensure_capacity(text.len())?;
        self.buffer.push_str(text);
        Ok(())
    }

    fn ensure_capacity(&mut self, additional: usize) -> Result<()> {
        let required = self
            .buffer
            .len()
            .checked_add(additional)
            .ok_or(LineProtocolError::BufferFull)?;

        if required <= self.capacity {
            return Ok(());
        }

        let mut new_capacity = self.capacity * 2;
        while new_capacity < required {
            new_capacity *= 2;
        }

        if new_capacity > MAX_RECORD_SIZE {
            if required > MAX_RECORD_SIZE {
                return Err(LineProtocolError::BufferFull);
            }
            new_capacity = MAX_RECORD_SIZE;
        }

        self.buffer
            .try_reserve_exact(new_capacity - self.buffer.len())
            .map_err(|_| LineProtocolError::MemoryAlloc)?;
        self.capacity = new_capacity;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_protocol::decoder::parse_line;

    fn builder_with_field() -> LineProtocolBuilder {
        let mut builder = LineProtocolBuilder::new();
        builder.set_measurement("m").unwrap();
        builder.add_field_double("v", 1.0).unwrap();
        builder
    }

    #[test]
    fn test_full_record() {
        let mut builder = LineProtocolBuilder::new();
        builder.set_measurement("measurements").unwrap();
        builder.add_tag("source", "instrumentacao").unwrap();
        builder.add_tag("board", "1").unwrap();
        builder.add_field_double("A0", 123.456).unwrap();
        builder.add_field_integer("count", 7).unwrap();
        builder.add_field_string("note", "ok").unwrap();
        builder.add_field_boolean("armed", false).unwrap();
        builder.set_timestamp(1_700_000_000).unwrap();

        assert_eq!(
            builder.finalize().unwrap(),
            "measurements,source=instrumentacao,board=1 A0=123.456000,count=7i,note=\"ok\",armed=false 1700000000"
        );
    }

    #[test]
    fn test_tag_after_field_is_invalid_state() {
        let keys = ["t", "valid_key", "bad-key", ""];
        let values = ["x", "", "with space"];

        for key in keys {
            for value in values {
                let mut builder = builder_with_field();
                let before = builder.len();
                assert_eq!(
                    builder.add_tag(key, value),
                    Err(LineProtocolError::InvalidState),
                    "key={:?} value={:?}",
                    key,
                    value
                );
                assert_eq!(builder.len(), before);
            }
        }
    }

    #[test]
    fn test_tag_without_measurement() {
        let mut builder = LineProtocolBuilder::new();
        assert_eq!(builder.add_tag("t", "v"), Err(LineProtocolError::InvalidState));
    }

    #[test]
    fn test_invalid_keys() {
        let mut builder = LineProtocolBuilder::new();
        builder.set_measurement("m").unwrap();
        assert_eq!(builder.add_tag("bad key", "v"), Err(LineProtocolError::InvalidTagKey));
        assert_eq!(builder.add_field_double("bad.key", 1.0), Err(LineProtocolError::InvalidFieldKey));
        assert_eq!(builder.add_field_integer("", 1), Err(LineProtocolError::InvalidFieldKey));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_invalid_measurement() {
        let mut builder = LineProtocolBuilder::new();
        assert_eq!(builder.set_measurement(""), Err(LineProtocolError::InvalidMeasurement));
        assert_eq!(builder.set_measurement("_m"), Err(LineProtocolError::InvalidMeasurement));
        assert_eq!(builder.set_measurement("m m"), Err(LineProtocolError::InvalidMeasurement));
        assert!(builder.is_empty());
    }

    #[test]
    fn test_non_finite_double_leaves_state_unchanged() {
        let mut builder = LineProtocolBuilder::new();
        builder.set_measurement("m").unwrap();
        builder.add_tag("t", "1").unwrap();
        let snapshot = builder.len();

        assert_eq!(builder.add_field_double("v", f64::NAN), Err(LineProtocolError::InvalidParam));
        assert_eq!(builder.add_field_double("v", f64::INFINITY), Err(LineProtocolError::InvalidParam));
        assert_eq!(builder.len(), snapshot);

        // Still in the tag phase: no field was recorded
        assert!(builder.add_tag("u", "2").is_ok());
        assert_eq!(builder.validate(), Err(LineProtocolError::InvalidState));
    }

    #[test]
    fn test_string_with_line_break_is_rejected() {
        let mut builder = LineProtocolBuilder::new();
        builder.set_measurement("m").unwrap();
        let snapshot = builder.len();

        assert_eq!(
            builder.add_field_string("note", "line1\nline2"),
            Err(LineProtocolError::InvalidParam)
        );
        assert_eq!(
            builder.add_field_string("note", "line1\r\nline2"),
            Err(LineProtocolError::InvalidParam)
        );
        assert_eq!(
            builder.add_field("note", &FieldValue::from("trailing\r")),
            Err(LineProtocolError::InvalidParam)
        );
        assert_eq!(builder.len(), snapshot);

        builder.add_field_string("note", "line1 line2").unwrap();
        builder.set_timestamp(1).unwrap();
        let record = builder.copy().unwrap();
        assert_eq!(record.as_str(), "m note=\"line1 line2\" 1");
        assert!(!record.as_str().contains(|c: char| c == '\n' || c == '\r'));
    }

    #[test]
    fn test_field_without_measurement() {
        let mut builder = LineProtocolBuilder::new();
        assert_eq!(builder.add_field_boolean("b", true), Err(LineProtocolError::InvalidState));
    }

    #[test]
    fn test_timestamp_requires_fields() {
        let mut builder = LineProtocolBuilder::new();
        assert_eq!(builder.set_timestamp(1), Err(LineProtocolError::InvalidState));
        builder.set_measurement("m").unwrap();
        assert_eq!(builder.set_timestamp(1), Err(LineProtocolError::InvalidState));
        builder.add_field_integer("n", 1).unwrap();
        assert!(builder.set_timestamp(1).is_ok());
    }

    #[test]
    fn test_timestamp_only_once_and_closes_fields() {
        let mut builder = builder_with_field();
        builder.set_timestamp(10).unwrap();
        assert_eq!(builder.set_timestamp(11), Err(LineProtocolError::InvalidState));
        assert_eq!(builder.add_field_integer("n", 1), Err(LineProtocolError::InvalidState));
    }

    #[test]
    fn test_finalize_injects_timestamp() {
        let mut builder = builder_with_field();
        let before = current_timestamp();
        let line = builder.finalize().unwrap().to_string();
        let after = current_timestamp();

        let parsed = parse_line(&line).unwrap();
        let ts = parsed.timestamp.unwrap();
        assert!(ts >= before && ts <= after);
    }

    #[test]
    fn test_finalize_requires_measurement_and_fields() {
        let mut builder = LineProtocolBuilder::new();
        assert_eq!(builder.copy(), Err(LineProtocolError::InvalidMeasurement));

        builder.set_measurement("m").unwrap();
        assert_eq!(builder.copy(), Err(LineProtocolError::InvalidState));
        assert!(!builder.is_finalized());
    }

    #[test]
    fn test_finalized_builder_is_immutable() {
        let mut builder = builder_with_field();
        builder.set_timestamp(5).unwrap();
        let record = builder.copy().unwrap();

        assert_eq!(builder.set_measurement("other"), Err(LineProtocolError::InvalidState));
        assert_eq!(builder.add_field_double("w", 2.0), Err(LineProtocolError::InvalidState));
        assert_eq!(builder.add_tag("t", "v"), Err(LineProtocolError::InvalidState));

        // Finalizing again yields the same record
        assert_eq!(builder.copy().unwrap(), record);

        builder.reset();
        assert!(builder.set_measurement("other").is_ok());
    }

    #[test]
    fn test_set_measurement_restarts_record() {
        let mut builder = LineProtocolBuilder::new();
        builder.set_measurement("first").unwrap();
        builder.add_tag("t", "1").unwrap();
        builder.add_field_integer("n", 1).unwrap();

        builder.set_measurement("second").unwrap();
        assert_eq!(builder.len(), "second".len());
        assert!(builder.add_tag("t", "2").is_ok());
    }

    #[test]
    fn test_generic_add_field_dispatch() {
        let mut builder = LineProtocolBuilder::new();
        builder.set_measurement("m").unwrap();
        builder.add_field("d", &FieldValue::from(0.5)).unwrap();
        builder.add_field("i", &FieldValue::from(-3i64)).unwrap();
        builder.add_field("s", &FieldValue::from("a\"b")).unwrap();
        builder.add_field("b", &FieldValue::from(true)).unwrap();
        builder.set_timestamp(0).unwrap();

        assert_eq!(builder.build().unwrap().as_str(), "m d=0.500000,i=-3i,s=\"a\\\"b\",b=true 0");
    }

    #[test]
    fn test_string_escaping_round_trip() {
        let original = "\"a\\b\"";
        let mut builder = LineProtocolBuilder::new();
        builder.set_measurement("m").unwrap();
        builder.add_field_string("key", original).unwrap();
        builder.set_timestamp(1).unwrap();
        let record = builder.copy().unwrap();

        assert_eq!(record.as_str(), "m key=\"\\\"a\\\\b\\\"\" 1");

        let parsed = parse_line(record.as_str()).unwrap();
        assert_eq!(parsed.fields[0].1, FieldValue::String(original.to_string()));
    }

    #[test]
    fn test_round_trip_through_parser() {
        let mut builder = LineProtocolBuilder::new();
        builder.set_measurement("env.sensor-1").unwrap();
        builder.add_tag("site", "north").unwrap();
        builder.add_field_double("temp", -12.25).unwrap();
        builder.add_field_integer("raw", 30123).unwrap();
        builder.add_field_string("label", "probe, \"outer\" =1").unwrap();
        builder.add_field_boolean("ok", true).unwrap();
        builder.set_timestamp(1_650_000_000).unwrap();
        let record = builder.copy().unwrap();

        let parsed = parse_line(record.as_str()).unwrap();
        assert_eq!(parsed.measurement, "env.sensor-1");
        assert_eq!(parsed.tags, vec![("site".to_string(), "north".to_string())]);
        assert_eq!(
            parsed.fields,
            vec![
                ("temp".to_string(), FieldValue::Double(-12.25)),
                ("raw".to_string(), FieldValue::Integer(30123)),
                ("label".to_string(), FieldValue::String("probe, \"outer\" =1".to_string())),
                ("ok".to_string(), FieldValue::Boolean(true)),
            ]
        );
        assert_eq!(parsed.timestamp, Some(1_650_000_000));
    }

    #[test]
    fn test_capacity_minimum_and_maximum() {
        assert_eq!(LineProtocolBuilder::new().capacity(), DEFAULT_CAPACITY);
        assert_eq!(LineProtocolBuilder::with_capacity(8).unwrap().capacity(), MIN_CAPACITY);
        assert_eq!(LineProtocolBuilder::with_capacity(4096).unwrap().capacity(), 4096);
        assert_eq!(
            LineProtocolBuilder::with_capacity(MAX_RECORD_SIZE + 1).unwrap_err(),
            LineProtocolError::InvalidParam
        );
    }

    #[test]
    fn test_buffer_doubles_on_growth() {
        let mut builder = LineProtocolBuilder::with_capacity(64).unwrap();
        builder.set_measurement("m").unwrap();
        builder.add_field_string("s", &"x".repeat(100)).unwrap();
        assert_eq!(builder.capacity(), 128);

        builder.add_field_string("t", &"y".repeat(300)).unwrap();
        assert_eq!(builder.capacity(), 512);
    }

    #[test]
    fn test_buffer_full_at_max_record_size() {
        let mut builder = LineProtocolBuilder::new();
        builder.set_measurement("m").unwrap();
        let big = "z".repeat(MAX_RECORD_SIZE);

        let before = builder.len();
        assert_eq!(builder.add_field_string("s", &big), Err(LineProtocolError::BufferFull));
        assert_eq!(builder.len(), before);
        assert!(builder.capacity() <= MAX_RECORD_SIZE);

        // A field that fits is still accepted afterwards
        assert!(builder.add_field_string("s", &"z".repeat(1000)).is_ok());
    }

    #[test]
    fn test_record_parse() {
        let record = Record::parse("m v=1i 10\n").unwrap();
        assert_eq!(record.as_str(), "m v=1i 10");
        assert_eq!(record.to_string(), "m v=1i 10");
        assert_eq!(String::from(record.clone()), "m v=1i 10");
        assert_eq!(record.len(), 9);

        assert!(Record::parse("m 10").is_err());
        assert_eq!(
            Record::parse("m s=\"a\nb\" 10"),
            Err(LineProtocolError::InvalidParam)
        );
        assert!(Record::parse("_m v=1 10").is_err());
    }
}
